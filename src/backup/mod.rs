//! Backup of an existing installation
//!
//! Snapshots the installation root into
//! `<backup_dir>/cef_backup_{YYYYmmdd_HHMMSS_mmm}.tar.gz`. The archive is
//! written to a `.partial` file and renamed, so a file with the final name
//! is always complete.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cef_archive::{ArchiveError, ArchiveKind};

use crate::detect::InstallationRecord;

pub const BACKUP_PREFIX: &str = "cef_backup_";

/// Backup errors; fatal to the acquire workflow
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("installation root {0} does not exist")]
    SourceMissing(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// A completed (or, under dry-run, simulated) backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArchive {
    pub source_path: PathBuf,
    pub archive_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Dry-run record; nothing was written
    #[serde(default)]
    pub simulated: bool,
}

impl BackupArchive {
    pub fn restore_instructions(&self) -> RestoreInstructions {
        RestoreInstructions::for_archive(self)
    }
}

/// How an operator restores a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreInstructions {
    pub archive_path: PathBuf,
    /// Directory the archive is extracted into (parent of the installation root)
    pub extract_into: PathBuf,
    /// Installation root the archive recreates
    pub restores: PathBuf,
    pub command: String,
}

impl RestoreInstructions {
    pub fn for_archive(archive: &BackupArchive) -> Self {
        let extract_into = archive
            .source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let command = format!(
            "tar -xzf \"{}\" -C \"{}\"",
            archive.archive_path.display(),
            extract_into.display()
        );
        Self {
            archive_path: archive.archive_path.clone(),
            extract_into,
            restores: archive.source_path.clone(),
            command,
        }
    }
}

/// Owns the backup directory and every archive it writes there
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Back up `record`'s root; `None` when nothing was found
    pub fn backup(
        &self,
        record: &InstallationRecord,
        dry_run: bool,
    ) -> Result<Option<BackupArchive>, BackupError> {
        self.backup_at(record, dry_run, Local::now())
    }

    pub fn backup_at(
        &self,
        record: &InstallationRecord,
        dry_run: bool,
        now: DateTime<Local>,
    ) -> Result<Option<BackupArchive>, BackupError> {
        if !record.found {
            tracing::info!("no existing installation, nothing to back up");
            return Ok(None);
        }
        let source = &record.root_path;
        if !source.is_dir() {
            return Err(BackupError::SourceMissing(source.clone()));
        }

        let stamp = now.format("%Y%m%d_%H%M%S_%3f").to_string();
        let archive_path = self.unused_name(&stamp);

        if dry_run {
            tracing::info!(
                source = %source.display(),
                archive = %archive_path.display(),
                "[dry-run] would back up installation"
            );
            return Ok(Some(BackupArchive {
                source_path: source.clone(),
                archive_path,
                created_at: now.with_timezone(&Utc),
                size_bytes: 0,
                simulated: true,
            }));
        }

        fs::create_dir_all(&self.backup_dir).map_err(|source| BackupError::Io {
            path: self.backup_dir.clone(),
            source,
        })?;

        let partial = archive_path.with_extension("gz.partial");
        let root_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "cef".to_string());

        let written = cef_archive::create(ArchiveKind::TarGz, source, &root_name, &partial)
            .and_then(|size| {
                fs::rename(&partial, &archive_path)
                    .map(|_| size)
                    .map_err(|e| ArchiveError::Io {
                        path: archive_path.clone(),
                        source: e,
                    })
            });
        let size_bytes = match written {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e.into());
            }
        };

        tracing::info!(
            archive = %archive_path.display(),
            size_bytes,
            "backup created"
        );
        Ok(Some(BackupArchive {
            source_path: source.clone(),
            archive_path,
            created_at: now.with_timezone(&Utc),
            size_bytes,
            simulated: false,
        }))
    }

    fn unused_name(&self, stamp: &str) -> PathBuf {
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}{}.tar.gz", BACKUP_PREFIX, stamp)
            } else {
                format!("{}{}-{}.tar.gz", BACKUP_PREFIX, stamp, attempt)
            };
            let candidate = self.backup_dir.join(name);
            if !candidate.exists() {
                return candidate;
            }
            attempt += 1;
        }
    }
}
