//! CMake provisioning
//!
//! Resolution order:
//! - an explicit `--cmake-path`, which must exist
//! - the cache directory `<cache_root>/cmake-{version}-{suffix}`
//! - the Kitware release asset, downloaded and extracted into the cache
//!
//! Extraction happens in a staging directory that is renamed into place, so
//! a cache directory either holds a complete tool or does not exist. A
//! second provision of the same version is a cache hit with no network
//! traffic.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ulid::Ulid;

use cef_archive::{ArchiveError, ArchiveKind};
use cef_version::{Architecture, Platform, PlatformTarget};

use crate::download::{fetch_to_file, DownloadError, RetryPolicy};
use crate::http::{HttpClient, Progress};

/// Kitware release downloads
pub const RELEASE_BASE_URL: &str = "https://github.com/Kitware/CMake/releases/download";

/// Toolchain provisioning errors
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("configured CMake executable {0} does not exist")]
    ExplicitMissing(PathBuf),

    #[error("no CMake release is published for {0}")]
    UnsupportedHost(PlatformTarget),

    #[error("CMake download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("CMake extraction failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("extracted CMake release has no executable at {0}")]
    MissingExecutable(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where the tool came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    Explicit,
    Cached,
    Downloaded,
    /// Dry-run: would be downloaded to `path`
    Planned,
}

/// A resolved CMake executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedTool {
    pub version: String,
    pub path: PathBuf,
    pub source: ToolSource,
}

/// Release asset suffix for the host target
pub fn asset_suffix(target: PlatformTarget) -> Result<&'static str, ToolchainError> {
    match (target.platform, target.architecture) {
        (Platform::Windows, Architecture::X64) => Ok("windows-x86_64"),
        (Platform::Windows, Architecture::X86) => Ok("windows-i386"),
        (Platform::Windows, Architecture::Arm64) => Ok("windows-arm64"),
        (Platform::Macos, _) => Ok("macos-universal"),
        (Platform::Linux, Architecture::X64) => Ok("linux-x86_64"),
        (Platform::Linux, Architecture::Arm64) => Ok("linux-aarch64"),
        (Platform::Linux, Architecture::X86) => Err(ToolchainError::UnsupportedHost(target)),
    }
}

/// Archive format of the release asset
pub fn asset_kind(platform: Platform) -> ArchiveKind {
    match platform {
        Platform::Windows => ArchiveKind::Zip,
        Platform::Macos | Platform::Linux => ArchiveKind::TarGz,
    }
}

/// `cmake-{version}-{suffix}`
pub fn release_dir_name(version: &str, target: PlatformTarget) -> Result<String, ToolchainError> {
    Ok(format!("cmake-{}-{}", version, asset_suffix(target)?))
}

pub fn release_url(base: &str, version: &str, target: PlatformTarget) -> Result<String, ToolchainError> {
    Ok(format!(
        "{}/v{}/{}.{}",
        base.trim_end_matches('/'),
        version,
        release_dir_name(version, target)?,
        asset_kind(target.platform).extension()
    ))
}

/// Executable inside an extracted release directory
pub fn executable_in(release_dir: &Path, platform: Platform) -> PathBuf {
    match platform {
        Platform::Macos => release_dir.join("CMake.app/Contents/bin/cmake"),
        other => release_dir.join("bin").join(other.executable("cmake")),
    }
}

/// Provisions CMake into a cache directory it owns
pub struct ToolchainProvisioner {
    http: Arc<dyn HttpClient>,
    cache_root: PathBuf,
    base_url: String,
    policy: RetryPolicy,
}

impl ToolchainProvisioner {
    pub fn new(http: Arc<dyn HttpClient>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            http,
            cache_root: cache_root.into(),
            base_url: RELEASE_BASE_URL.to_string(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provision(
        &self,
        version: &str,
        target: PlatformTarget,
        explicit: Option<&Path>,
        dry_run: bool,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<ProvisionedTool, ToolchainError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ToolchainError::ExplicitMissing(path.to_path_buf()));
            }
            tracing::info!(path = %path.display(), "using configured CMake");
            return Ok(ProvisionedTool {
                version: version.to_string(),
                path: path.to_path_buf(),
                source: ToolSource::Explicit,
            });
        }

        let dir_name = release_dir_name(version, target)?;
        let cache_dir = self.cache_root.join(&dir_name);
        let executable = executable_in(&cache_dir, target.platform);
        if executable.is_file() {
            tracing::info!(path = %executable.display(), "CMake cache hit");
            return Ok(ProvisionedTool {
                version: version.to_string(),
                path: executable,
                source: ToolSource::Cached,
            });
        }

        let url = release_url(&self.base_url, version, target)?;
        if dry_run {
            tracing::info!(url = %url, dest = %cache_dir.display(), "[dry-run] would download CMake");
            return Ok(ProvisionedTool {
                version: version.to_string(),
                path: executable,
                source: ToolSource::Planned,
            });
        }

        let archive = self.cache_root.join(format!(
            "{}.{}",
            dir_name,
            asset_kind(target.platform).extension()
        ));
        fetch_to_file(self.http.as_ref(), &url, &archive, &self.policy, progress)?;

        let staging = self.cache_root.join(format!(".staging-{}", Ulid::new()));
        let installed = self.install_release(&archive, &staging, &dir_name, &cache_dir);
        let _ = fs::remove_dir_all(&staging);
        let _ = fs::remove_file(&archive);
        installed?;

        if !executable.is_file() {
            return Err(ToolchainError::MissingExecutable(executable));
        }
        tracing::info!(path = %executable.display(), "CMake provisioned");
        Ok(ProvisionedTool {
            version: version.to_string(),
            path: executable,
            source: ToolSource::Downloaded,
        })
    }

    fn install_release(
        &self,
        archive: &Path,
        staging: &Path,
        dir_name: &str,
        cache_dir: &Path,
    ) -> Result<(), ToolchainError> {
        cef_archive::extract(archive, staging)?;

        // Releases unpack to cmake-{version}-{suffix}/; accept any single top-level dir
        let expected = staging.join(dir_name);
        let release_root = if expected.is_dir() {
            expected
        } else {
            single_subdir(staging).unwrap_or_else(|| staging.to_path_buf())
        };

        if cache_dir.exists() {
            // Incomplete leftover without an executable
            fs::remove_dir_all(cache_dir).map_err(|source| ToolchainError::Io {
                path: cache_dir.to_path_buf(),
                source,
            })?;
        }
        fs::rename(&release_root, cache_dir).map_err(|source| ToolchainError::Io {
            path: cache_dir.to_path_buf(),
            source,
        })
    }
}

fn single_subdir(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).ok()?.filter_map(Result::ok);
    let first = entries.next()?;
    if entries.next().is_some() || !first.path().is_dir() {
        return None;
    }
    Some(first.path())
}
