//! Architecture from executable headers (ELF, PE, Mach-O)

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use cef_version::Architecture;

const ELF_MAGIC: &[u8] = b"\x7fELF";
const MACHO_64_LE: [u8; 4] = [0xcf, 0xfa, 0xed, 0xfe];
const MACHO_32_LE: [u8; 4] = [0xce, 0xfa, 0xed, 0xfe];
const MACHO_FAT: [u8; 4] = [0xca, 0xfe, 0xba, 0xbe];

const CPU_TYPE_X86: u32 = 7;
const CPU_TYPE_X86_64: u32 = 0x0100_0007;
const CPU_TYPE_ARM64: u32 = 0x0100_000c;

/// Read the architecture of the binary at `path`.
///
/// Returns `Ok(None)` for files that are not a recognised executable format
/// or target an architecture outside x86/x64/arm64.
pub fn sniff_architecture(path: &Path) -> io::Result<Option<Architecture>> {
    let mut file = File::open(path)?;
    let mut head = [0u8; 64];
    let n = read_up_to(&mut file, &mut head)?;
    let head = &head[..n];

    if head.starts_with(ELF_MAGIC) {
        return Ok(elf_machine(head));
    }
    if head.starts_with(b"MZ") {
        return pe_machine(&mut file, head);
    }
    if head.len() >= 8 {
        let magic = [head[0], head[1], head[2], head[3]];
        if magic == MACHO_64_LE || magic == MACHO_32_LE {
            return Ok(macho_cpu(u32::from_le_bytes([head[4], head[5], head[6], head[7]])));
        }
        // Universal binary: report the first slice
        if magic == MACHO_FAT && head.len() >= 12 {
            return Ok(macho_cpu(u32::from_be_bytes([
                head[8], head[9], head[10], head[11],
            ])));
        }
    }
    Ok(None)
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn elf_machine(head: &[u8]) -> Option<Architecture> {
    if head.len() < 20 {
        return None;
    }
    let machine = match head[5] {
        2 => u16::from_be_bytes([head[18], head[19]]),
        _ => u16::from_le_bytes([head[18], head[19]]),
    };
    match machine {
        3 => Some(Architecture::X86),
        62 => Some(Architecture::X64),
        183 => Some(Architecture::Arm64),
        _ => None,
    }
}

fn pe_machine(file: &mut File, head: &[u8]) -> io::Result<Option<Architecture>> {
    if head.len() < 0x40 {
        return Ok(None);
    }
    let offset = u32::from_le_bytes([head[0x3c], head[0x3d], head[0x3e], head[0x3f]]);
    file.seek(SeekFrom::Start(u64::from(offset)))?;
    let mut pe = [0u8; 6];
    if read_up_to(file, &mut pe)? < pe.len() || &pe[..4] != b"PE\0\0" {
        return Ok(None);
    }
    Ok(match u16::from_le_bytes([pe[4], pe[5]]) {
        0x014c => Some(Architecture::X86),
        0x8664 => Some(Architecture::X64),
        0xaa64 => Some(Architecture::Arm64),
        _ => None,
    })
}

fn macho_cpu(cputype: u32) -> Option<Architecture> {
    match cputype {
        CPU_TYPE_X86 => Some(Architecture::X86),
        CPU_TYPE_X86_64 => Some(Architecture::X64),
        CPU_TYPE_ARM64 => Some(Architecture::Arm64),
        _ => None,
    }
}

/// Minimal headers, used by tests and fixtures to fake core libraries
pub mod fake {
    use cef_version::{Architecture, Platform};

    /// Header bytes a `platform` loader would accept for `arch`
    pub fn header(platform: Platform, arch: Architecture) -> Vec<u8> {
        match platform {
            Platform::Linux => {
                let machine: u16 = match arch {
                    Architecture::X86 => 3,
                    Architecture::X64 => 62,
                    Architecture::Arm64 => 183,
                };
                let mut bytes = vec![0u8; 64];
                bytes[..4].copy_from_slice(b"\x7fELF");
                bytes[4] = 2;
                bytes[5] = 1;
                bytes[18..20].copy_from_slice(&machine.to_le_bytes());
                bytes
            }
            Platform::Windows => {
                let machine: u16 = match arch {
                    Architecture::X86 => 0x014c,
                    Architecture::X64 => 0x8664,
                    Architecture::Arm64 => 0xaa64,
                };
                let mut bytes = vec![0u8; 0x80 + 6];
                bytes[..2].copy_from_slice(b"MZ");
                bytes[0x3c..0x40].copy_from_slice(&0x80u32.to_le_bytes());
                bytes[0x80..0x84].copy_from_slice(b"PE\0\0");
                bytes[0x84..0x86].copy_from_slice(&machine.to_le_bytes());
                bytes
            }
            Platform::Macos => {
                let cpu: u32 = match arch {
                    Architecture::X86 => super::CPU_TYPE_X86,
                    Architecture::X64 => super::CPU_TYPE_X86_64,
                    Architecture::Arm64 => super::CPU_TYPE_ARM64,
                };
                let mut bytes = vec![0u8; 32];
                bytes[..4].copy_from_slice(&super::MACHO_64_LE);
                bytes[4..8].copy_from_slice(&cpu.to_le_bytes());
                bytes
            }
        }
    }
}
