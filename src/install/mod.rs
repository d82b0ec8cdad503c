//! Extraction and installation of a downloaded distribution
//!
//! The archive is unpacked into a scratch directory, the framework root is
//! located with the detector heuristic (archive layouts vary), and that root
//! is moved into the target. A populated target is only replaced under an
//! [`InstallClearance`] whose backup covers the whole target; the previous
//! contents are set aside until the new tree is in place and restored if the
//! move fails.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use ulid::Ulid;
use walkdir::WalkDir;

use cef_archive::{ArchiveError, ArchiveKind};
use cef_version::Platform;

use crate::backup::BackupArchive;
use crate::detect::{locate_framework_root, DetectError, InstallationDetector, InstallationRecord, DEFAULT_MAX_DEPTH};
use crate::download::DownloadArtifact;

/// Installation errors
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(PathBuf),

    #[error("extraction failed: {0}")]
    Extraction(#[source] ArchiveError),

    #[error("no CEF framework found inside {0}")]
    FrameworkNotFound(PathBuf),

    #[error("refusing to replace {0}: its contents are not covered by a backup")]
    UnprotectedReplace(PathBuf),

    #[error("download artifact has no local file")]
    MissingArtifact,

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Detect(#[from] DetectError),
}

impl From<ArchiveError> for InstallError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::Unsupported(path) => InstallError::UnsupportedArchive(path),
            other => InstallError::Extraction(other),
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> InstallError + '_ {
    move |source| InstallError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Permission to replace the target's contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "clearance", rename_all = "snake_case")]
pub enum InstallClearance {
    /// Nothing was archived; only an empty or missing target may be used
    Fresh,
    /// `source` was archived to `archive`
    BackedUp { archive: PathBuf, source: PathBuf },
}

impl InstallClearance {
    pub fn fresh() -> Self {
        InstallClearance::Fresh
    }

    pub fn backed_up(archive: &BackupArchive) -> Self {
        InstallClearance::BackedUp {
            archive: archive.archive_path.clone(),
            source: archive.source_path.clone(),
        }
    }

    /// Whether everything under `target` is in the archive
    pub fn covers(&self, target: &Path) -> bool {
        match self {
            InstallClearance::Fresh => false,
            InstallClearance::BackedUp { source, .. } => target.starts_with(source),
        }
    }
}

/// Installs distributions for one platform using a scratch area it owns
#[derive(Debug, Clone)]
pub struct Installer {
    platform: Platform,
    scratch_dir: PathBuf,
}

impl Installer {
    pub fn new(platform: Platform, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Install `artifact` into `target_dir`.
    ///
    /// Under dry-run the archive (when one is present) is extracted into
    /// scratch and validated, `target_dir` is never touched, and the returned
    /// record has `found == false` with the version that would be installed.
    pub fn install(
        &self,
        artifact: &DownloadArtifact,
        target_dir: &Path,
        clearance: &InstallClearance,
        dry_run: bool,
    ) -> Result<InstallationRecord, InstallError> {
        let Some(archive) = artifact.local_path.as_deref() else {
            if dry_run {
                tracing::info!(target = %target_dir.display(), "[dry-run] would extract and install");
                return Ok(InstallationRecord::not_found(target_dir, self.platform));
            }
            return Err(InstallError::MissingArtifact);
        };
        ArchiveKind::from_path(archive)?;

        let extract_dir = self.scratch_dir.join(format!("extract-{}", Ulid::new()));
        let result = self.install_from(archive, &extract_dir, target_dir, clearance, dry_run);
        if extract_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&extract_dir) {
                tracing::warn!(path = %extract_dir.display(), error = %e, "failed to remove scratch");
            }
        }
        result
    }

    fn install_from(
        &self,
        archive: &Path,
        extract_dir: &Path,
        target_dir: &Path,
        clearance: &InstallClearance,
        dry_run: bool,
    ) -> Result<InstallationRecord, InstallError> {
        let report = cef_archive::extract(archive, extract_dir)?;
        tracing::info!(archive = %archive.display(), entries = report.entries, "archive extracted");

        let root = locate_framework_root(extract_dir, self.platform, DEFAULT_MAX_DEPTH)?
            .ok_or_else(|| InstallError::FrameworkNotFound(archive.to_path_buf()))?;
        let detector = InstallationDetector::new(self.platform);

        if dry_run {
            let staged = detector.try_detect(&root)?;
            tracing::info!(
                root = %root.display(),
                target = %target_dir.display(),
                "[dry-run] archive validated, target untouched"
            );
            return Ok(InstallationRecord {
                found: false,
                root_path: target_dir.to_path_buf(),
                ..staged
            });
        }

        self.replace_target(&root, target_dir, clearance)?;
        let record = detector.try_detect(target_dir)?;
        if !record.found {
            return Err(InstallError::FrameworkNotFound(target_dir.to_path_buf()));
        }
        tracing::info!(installed = %record.describe(), "installation complete");
        Ok(record)
    }

    fn replace_target(
        &self,
        new_root: &Path,
        target_dir: &Path,
        clearance: &InstallClearance,
    ) -> Result<(), InstallError> {
        let populated = fs::read_dir(target_dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);

        let set_aside = if populated {
            if !clearance.covers(target_dir) {
                return Err(InstallError::UnprotectedReplace(target_dir.to_path_buf()));
            }
            let aside = sibling(target_dir, &format!("replaced-{}", Ulid::new()));
            fs::rename(target_dir, &aside).map_err(io_err(target_dir))?;
            Some(aside)
        } else {
            if target_dir.exists() {
                fs::remove_dir(target_dir).map_err(io_err(target_dir))?;
            }
            None
        };

        if let Some(parent) = target_dir.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        if let Err(e) = move_dir(new_root, target_dir) {
            if let Some(aside) = &set_aside {
                let _ = fs::remove_dir_all(target_dir);
                if let Err(restore) = fs::rename(aside, target_dir) {
                    tracing::error!(
                        previous = %aside.display(),
                        error = %restore,
                        "could not put the previous installation back"
                    );
                }
            }
            return Err(e);
        }

        if let Some(aside) = set_aside {
            if let Err(e) = fs::remove_dir_all(&aside) {
                tracing::warn!(path = %aside.display(), error = %e, "failed to remove replaced installation");
            }
        }
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}", suffix));
    path.with_file_name(name)
}

/// Rename, falling back to copy-and-delete across filesystems
fn move_dir(from: &Path, to: &Path) -> Result<(), InstallError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_dir(from, to)?;
    fs::remove_dir_all(from).map_err(io_err(from))
}

/// Recursive copy of `from` to `to`
pub fn copy_dir(from: &Path, to: &Path) -> Result<u64, InstallError> {
    let mut files = 0;
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| InstallError::Io {
            path: from.to_path_buf(),
            source: e.into(),
        })?;
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(io_err(&dest))?;
        } else {
            fs::copy(entry.path(), &dest).map_err(io_err(&dest))?;
            files += 1;
        }
    }
    Ok(files)
}
