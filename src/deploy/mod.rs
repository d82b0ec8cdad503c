//! Artifact collection
//!
//! Each manifest entry is resolved against the source roots in precedence
//! order; the first root with at least one match supplies every match for
//! that entry. The glob's literal directory prefix is stripped when the
//! destination path is computed, so `locales/*.pak` into `locales` yields
//! `locales/en-US.pak`, not `locales/locales/en-US.pak`.

pub mod manifest;

pub use manifest::{ArtifactCategory, DeploymentManifest, ManifestEntry};

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::BuildType;

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("invalid glob '{glob}': {source}")]
    Pattern {
        glob: String,
        #[source]
        source: globset::Error,
    },

    #[error("required artifacts missing: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An entry that matched nothing in any root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingArtifact {
    pub source_glob: String,
    pub category: ArtifactCategory,
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    /// Files copied (or that would be copied under dry-run)
    pub copied: usize,
    pub missing: Vec<MissingArtifact>,
    pub dry_run: bool,
}

impl CollectionReport {
    pub fn missing_required(&self) -> impl Iterator<Item = &MissingArtifact> {
        self.missing.iter().filter(|m| m.required)
    }
}

/// Candidate roots for the build outputs, highest precedence first
pub fn source_roots(framework_root: &Path, build_dir: &Path, configuration: BuildType) -> Vec<PathBuf> {
    let wrapper = build_dir.join(crate::native::WRAPPER_TARGET);
    vec![
        wrapper.join(configuration.as_str()),
        wrapper,
        framework_root.join(configuration.as_str()),
        framework_root.join("Resources"),
        framework_root.to_path_buf(),
        build_dir.to_path_buf(),
    ]
}

/// Directory components of `glob` before the first wildcard (final component excluded)
fn literal_prefix(glob: &str) -> PathBuf {
    let parts: Vec<&str> = glob.split('/').collect();
    let mut prefix = PathBuf::new();
    for part in &parts[..parts.len().saturating_sub(1)] {
        if part.contains(['*', '?', '[', '{']) {
            break;
        }
        prefix.push(part);
    }
    prefix
}

fn matcher(glob: &str) -> Result<GlobMatcher, CollectionError> {
    GlobBuilder::new(glob)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|source| CollectionError::Pattern {
            glob: glob.to_string(),
            source,
        })
}

/// Copies manifest entries from source roots into one destination root
#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    roots: Vec<PathBuf>,
    dest_root: PathBuf,
}

impl ArtifactCollector {
    pub fn new(roots: Vec<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            roots,
            dest_root: dest_root.into(),
        }
    }

    /// Files under the first root matching `entry`, as (root, relative path)
    fn resolve(&self, entry: &ManifestEntry) -> Result<Vec<(PathBuf, PathBuf)>, CollectionError> {
        let glob = matcher(&entry.source_glob)?;
        let prefix = literal_prefix(&entry.source_glob);

        for root in &self.roots {
            let start = root.join(&prefix);
            if !start.is_dir() {
                continue;
            }
            let mut found = Vec::new();
            for item in WalkDir::new(&start).sort_by_file_name() {
                let item = match item {
                    Ok(item) => item,
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                if !item.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = item.path().strip_prefix(root) else {
                    continue;
                };
                let rel_str = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if glob.is_match(&rel_str) {
                    found.push((root.clone(), rel.to_path_buf()));
                }
            }
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    /// Copy every entry of `manifest`; missing required entries fail unless dry-run
    pub fn collect(
        &self,
        manifest: &DeploymentManifest,
        dry_run: bool,
    ) -> Result<CollectionReport, CollectionError> {
        let mut report = CollectionReport {
            dry_run,
            ..Default::default()
        };

        for entry in &manifest.entries {
            let matches = self.resolve(entry)?;
            if matches.is_empty() {
                if entry.required {
                    tracing::warn!(glob = %entry.source_glob, "required artifact not found");
                } else {
                    tracing::debug!(glob = %entry.source_glob, "optional artifact not found");
                }
                report.missing.push(MissingArtifact {
                    source_glob: entry.source_glob.clone(),
                    category: entry.category,
                    required: entry.required,
                });
                continue;
            }

            let prefix = literal_prefix(&entry.source_glob);
            for (root, rel) in matches {
                let tail = rel.strip_prefix(&prefix).unwrap_or(&rel);
                let dest = self.dest_root.join(&entry.destination_dir).join(tail);
                if !dry_run {
                    copy_file(&root.join(&rel), &dest)?;
                }
                report.copied += 1;
            }
        }

        let required: Vec<String> = report
            .missing_required()
            .map(|m| m.source_glob.clone())
            .collect();
        if dry_run {
            tracing::info!(
                files = report.copied,
                dest = %self.dest_root.display(),
                "[dry-run] would deploy"
            );
        } else if !required.is_empty() {
            return Err(CollectionError::MissingRequired(required));
        } else {
            tracing::info!(files = report.copied, dest = %self.dest_root.display(), "artifacts deployed");
        }
        Ok(report)
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), CollectionError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|source| CollectionError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::copy(from, to).map_err(|source| CollectionError::Io {
        path: to.to_path_buf(),
        source,
    })?;
    Ok(())
}
