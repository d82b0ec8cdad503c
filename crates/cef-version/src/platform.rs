//! Target platform and CPU architecture.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors for platform/architecture parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("unknown platform '{0}' (expected windows, macos or linux)")]
    UnknownPlatform(String),

    #[error("unknown architecture '{0}' (expected x86, x64 or arm64)")]
    UnknownArchitecture(String),
}

/// Operating system family a distribution targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
}

impl Platform {
    /// Platform of the running process
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Platform::Windows,
            "macos" => Platform::Macos,
            _ => Platform::Linux,
        }
    }

    /// Prefix used in CDN file names (`windows64`, `macosx64`, `linux64`)
    pub fn cdn_prefix(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Macos => "macosx",
            Platform::Linux => "linux",
        }
    }

    /// File name of the executable for `stem` on this platform
    pub fn executable(&self, stem: &str) -> String {
        match self {
            Platform::Windows => format!("{}.exe", stem),
            _ => stem.to_string(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
        };
        f.write_str(s)
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(Platform::Windows),
            "macos" | "macosx" | "darwin" | "mac" => Ok(Platform::Macos),
            "linux" => Ok(Platform::Linux),
            other => Err(PlatformError::UnknownPlatform(other.to_string())),
        }
    }
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Architecture {
    X86,
    X64,
    Arm64,
}

impl Architecture {
    /// Architecture of the running process
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86" => Architecture::X86,
            "aarch64" => Architecture::Arm64,
            _ => Architecture::X64,
        }
    }

    /// Suffix used in CDN file names (`32`, `64`, `arm64`)
    pub fn cdn_suffix(&self) -> &'static str {
        match self {
            Architecture::X86 => "32",
            Architecture::X64 => "64",
            Architecture::Arm64 => "arm64",
        }
    }

    /// Platform name understood by MSBuild and the Visual Studio generator `-A` flag
    pub fn msbuild_platform(&self) -> &'static str {
        match self {
            Architecture::X86 => "Win32",
            Architecture::X64 => "x64",
            Architecture::Arm64 => "ARM64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
            Architecture::Arm64 => "arm64",
        };
        f.write_str(s)
    }
}

impl FromStr for Architecture {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" | "win32" | "32" => Ok(Architecture::X86),
            "x64" | "x86_64" | "amd64" | "64" => Ok(Architecture::X64),
            "arm64" | "aarch64" => Ok(Architecture::Arm64),
            other => Err(PlatformError::UnknownArchitecture(other.to_string())),
        }
    }
}

impl TryFrom<String> for Architecture {
    type Error = PlatformError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Architecture> for String {
    fn from(value: Architecture) -> Self {
        value.to_string()
    }
}

/// A platform plus architecture pair, as named on the CEF CDN (`windows64`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformTarget {
    pub platform: Platform,
    pub architecture: Architecture,
}

impl PlatformTarget {
    pub fn new(platform: Platform, architecture: Architecture) -> Self {
        Self {
            platform,
            architecture,
        }
    }

    /// Target of the running process
    pub fn current() -> Self {
        Self::new(Platform::current(), Architecture::current())
    }

    /// Parse a CDN-style platform string.
    ///
    /// Accepts a bare platform (`windows`, `macos`) or one with an
    /// architecture suffix (`windows64`, `macosarm64`, `linux32`). The
    /// suffix, when present, is returned so callers can decide whether an
    /// explicit architecture setting overrides it.
    pub fn parse_platform(s: &str) -> Result<(Platform, Option<Architecture>), PlatformError> {
        let lower = s.trim().to_ascii_lowercase();
        for prefix in ["windows", "macosx", "macos", "linux", "darwin", "win", "mac"] {
            if let Some(rest) = lower.strip_prefix(prefix) {
                let platform: Platform = prefix.parse()?;
                if rest.is_empty() {
                    return Ok((platform, None));
                }
                let arch = rest
                    .parse::<Architecture>()
                    .map_err(|_| PlatformError::UnknownPlatform(s.to_string()))?;
                return Ok((platform, Some(arch)));
            }
        }
        Err(PlatformError::UnknownPlatform(s.to_string()))
    }

    /// CDN platform name (`windows64`, `macosarm64`, `linux64`)
    pub fn cdn_name(&self) -> String {
        let prefix = match (self.platform, self.architecture) {
            (Platform::Macos, Architecture::Arm64) => "macos",
            (platform, _) => platform.cdn_prefix(),
        };
        format!("{}{}", prefix, self.architecture.cdn_suffix())
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cdn_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_aliases() {
        assert_eq!("Windows".parse::<Platform>().unwrap(), Platform::Windows);
        assert_eq!("darwin".parse::<Platform>().unwrap(), Platform::Macos);
        assert_eq!("macosx".parse::<Platform>().unwrap(), Platform::Macos);
        assert!("solaris".parse::<Platform>().is_err());
    }

    #[test]
    fn test_architecture_aliases() {
        assert_eq!("x86_64".parse::<Architecture>().unwrap(), Architecture::X64);
        assert_eq!("AMD64".parse::<Architecture>().unwrap(), Architecture::X64);
        assert_eq!("aarch64".parse::<Architecture>().unwrap(), Architecture::Arm64);
        assert_eq!("i686".parse::<Architecture>().unwrap(), Architecture::X86);
        assert!("mips".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_parse_cdn_platform() {
        assert_eq!(
            PlatformTarget::parse_platform("windows64").unwrap(),
            (Platform::Windows, Some(Architecture::X64))
        );
        assert_eq!(
            PlatformTarget::parse_platform("macosarm64").unwrap(),
            (Platform::Macos, Some(Architecture::Arm64))
        );
        assert_eq!(
            PlatformTarget::parse_platform("linux").unwrap(),
            (Platform::Linux, None)
        );
        assert!(PlatformTarget::parse_platform("windowsxp").is_err());
        assert!(PlatformTarget::parse_platform("beos64").is_err());
    }

    #[test]
    fn test_cdn_names() {
        assert_eq!(
            PlatformTarget::new(Platform::Windows, Architecture::X64).cdn_name(),
            "windows64"
        );
        assert_eq!(
            PlatformTarget::new(Platform::Windows, Architecture::X86).cdn_name(),
            "windows32"
        );
        assert_eq!(
            PlatformTarget::new(Platform::Macos, Architecture::X64).cdn_name(),
            "macosx64"
        );
        assert_eq!(
            PlatformTarget::new(Platform::Macos, Architecture::Arm64).cdn_name(),
            "macosarm64"
        );
        assert_eq!(
            PlatformTarget::new(Platform::Linux, Architecture::Arm64).cdn_name(),
            "linuxarm64"
        );
    }

    #[test]
    fn test_msbuild_platform() {
        assert_eq!(Architecture::X86.msbuild_platform(), "Win32");
        assert_eq!(Architecture::X64.msbuild_platform(), "x64");
    }

    #[test]
    fn test_executable_names() {
        assert_eq!(Platform::Windows.executable("cmake"), "cmake.exe");
        assert_eq!(Platform::Linux.executable("cmake"), "cmake");
    }

    #[test]
    fn test_architecture_serde() {
        let json = serde_json::to_string(&Architecture::Arm64).unwrap();
        assert_eq!(json, "\"arm64\"");
        let parsed: Architecture = serde_json::from_str("\"x86_64\"").unwrap();
        assert_eq!(parsed, Architecture::X64);
    }
}
