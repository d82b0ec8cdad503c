//! Format-dispatching archive extraction and creation.
//!
//! Supports the three archive kinds CEF and CMake distributions ship as:
//! tar+bzip2, tar+gzip and zip. The kind is chosen from the file name.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use walkdir::WalkDir;

/// Archive errors
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("unsupported archive format: {0}")]
    Unsupported(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("zip error in {path}: {message}")]
    Zip { path: PathBuf, message: String },

    #[error("archive entry escapes destination: {0}")]
    UnsafeEntry(String),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl ArchiveError {
    fn io(path: &Path, source: io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Supported archive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarBz2,
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Pick the archive kind from a file name
    pub fn from_path(path: &Path) -> Result<Self, ArchiveError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Ok(ArchiveKind::TarBz2)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveKind::TarGz)
        } else if name.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else {
            Err(ArchiveError::Unsupported(path.to_path_buf()))
        }
    }

    /// Canonical file extension (without leading dot)
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::TarBz2 => "tar.bz2",
            ArchiveKind::TarGz => "tar.gz",
            ArchiveKind::Zip => "zip",
        }
    }
}

/// Result of an extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub kind: ArchiveKind,
    /// Number of entries written (files, directories and links)
    pub entries: usize,
}

/// Extract `archive` into `dest`, creating `dest` if needed
pub fn extract(archive: &Path, dest: &Path) -> Result<ExtractReport, ArchiveError> {
    let kind = ArchiveKind::from_path(archive)?;
    fs::create_dir_all(dest).map_err(|e| ArchiveError::io(dest, e))?;

    let file = File::open(archive).map_err(|e| ArchiveError::io(archive, e))?;
    let reader = BufReader::new(file);

    let entries = match kind {
        ArchiveKind::TarBz2 => unpack_tar(tar::Archive::new(BzDecoder::new(reader)), archive, dest)?,
        ArchiveKind::TarGz => unpack_tar(tar::Archive::new(GzDecoder::new(reader)), archive, dest)?,
        ArchiveKind::Zip => unpack_zip(reader, archive, dest)?,
    };

    tracing::debug!(archive = %archive.display(), dest = %dest.display(), entries, "extracted archive");
    Ok(ExtractReport { kind, entries })
}

fn unpack_tar<R: io::Read>(
    mut tar: tar::Archive<R>,
    archive: &Path,
    dest: &Path,
) -> Result<usize, ArchiveError> {
    tar.set_preserve_permissions(true);
    let mut count = 0;
    for entry in tar.entries().map_err(|e| ArchiveError::io(archive, e))? {
        let mut entry = entry.map_err(|e| ArchiveError::io(archive, e))?;
        // unpack_in refuses entries that would land outside dest
        let unpacked = entry.unpack_in(dest).map_err(|e| ArchiveError::io(archive, e))?;
        if !unpacked {
            let name = entry
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(ArchiveError::UnsafeEntry(name));
        }
        count += 1;
    }
    Ok(count)
}

fn unpack_zip<R: io::Read + io::Seek>(
    reader: R,
    archive: &Path,
    dest: &Path,
) -> Result<usize, ArchiveError> {
    let zip_err = |e: zip::result::ZipError| ArchiveError::Zip {
        path: archive.to_path_buf(),
        message: e.to_string(),
    };
    let mut zip = zip::ZipArchive::new(reader).map_err(zip_err)?;

    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(zip_err)?;
        let rel = file
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafeEntry(file.name().to_string()))?;
        let out = dest.join(rel);

        if file.is_dir() {
            fs::create_dir_all(&out).map_err(|e| ArchiveError::io(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }
        let mut target = File::create(&out).map_err(|e| ArchiveError::io(&out, e))?;
        io::copy(&mut file, &mut target).map_err(|e| ArchiveError::io(&out, e))?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode))
                .map_err(|e| ArchiveError::io(&out, e))?;
        }
    }
    Ok(zip.len())
}

/// Create an archive of `kind` at `archive` containing `source` under the
/// top-level name `root_name`.
///
/// Returns the size of the written archive in bytes.
pub fn create(
    kind: ArchiveKind,
    source: &Path,
    root_name: &str,
    archive: &Path,
) -> Result<u64, ArchiveError> {
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
    }
    let file = File::create(archive).map_err(|e| ArchiveError::io(archive, e))?;
    let writer = BufWriter::new(file);

    match kind {
        ArchiveKind::TarGz => {
            let encoder = GzEncoder::new(writer, flate2::Compression::default());
            let encoder = append_tar(encoder, source, root_name, archive)?;
            finish(encoder.finish(), archive)?;
        }
        ArchiveKind::TarBz2 => {
            let encoder = BzEncoder::new(writer, bzip2::Compression::default());
            let encoder = append_tar(encoder, source, root_name, archive)?;
            finish(encoder.finish(), archive)?;
        }
        ArchiveKind::Zip => write_zip(writer, source, root_name, archive)?,
    }

    let size = fs::metadata(archive)
        .map_err(|e| ArchiveError::io(archive, e))?
        .len();
    tracing::debug!(archive = %archive.display(), size, "created archive");
    Ok(size)
}

fn finish<W: Write>(result: io::Result<W>, archive: &Path) -> Result<(), ArchiveError> {
    let mut inner = result.map_err(|e| ArchiveError::io(archive, e))?;
    inner.flush().map_err(|e| ArchiveError::io(archive, e))
}

fn append_tar<W: Write>(
    writer: W,
    source: &Path,
    root_name: &str,
    archive: &Path,
) -> Result<W, ArchiveError> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(root_name, source)
        .map_err(|e| ArchiveError::io(source, e))?;
    builder.into_inner().map_err(|e| ArchiveError::io(archive, e))
}

fn write_zip<W: Write + io::Seek>(
    writer: W,
    source: &Path,
    root_name: &str,
    archive: &Path,
) -> Result<(), ArchiveError> {
    let zip_err = |e: zip::result::ZipError| ArchiveError::Zip {
        path: archive.to_path_buf(),
        message: e.to_string(),
    };
    let mut zip = zip::ZipWriter::new(writer);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| ArchiveError::UnsafeEntry(entry.path().display().to_string()))?;
        let name = zip_name(root_name, rel);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options).map_err(zip_err)?;
        } else if entry.file_type().is_file() {
            #[cfg(unix)]
            let options = {
                use std::os::unix::fs::PermissionsExt;
                let mode = entry
                    .metadata()
                    .map(|m| m.permissions().mode())
                    .unwrap_or(0o644);
                options.unix_permissions(mode)
            };
            zip.start_file(name, options).map_err(zip_err)?;
            let mut input = File::open(entry.path()).map_err(|e| ArchiveError::io(entry.path(), e))?;
            io::copy(&mut input, &mut zip).map_err(|e| ArchiveError::io(entry.path(), e))?;
        }
    }

    let mut inner = zip.finish().map_err(zip_err)?;
    inner.flush().map_err(|e| ArchiveError::io(archive, e))
}

/// Zip entry name with forward slashes regardless of host separator
fn zip_name(root_name: &str, rel: &Path) -> String {
    let mut parts = vec![root_name.to_string()];
    for component in rel.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_string_lossy().to_string());
        }
    }
    parts.join("/")
}
