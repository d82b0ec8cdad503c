//! CEF binary distribution download
//!
//! The URL is derived from version and platform target alone:
//! `{base}/cef_binary_{version}_{target}_minimal.{ext}` with `+` encoded.
//! The CDN publishes no checksum we can verify against, so every artifact
//! is marked `checksum_unverified` and carries the SHA-256 of what was
//! received for the record.

mod fetch;

pub use fetch::{fetch_to_file, partial_path, FetchedFile, RetryPolicy};

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cef_archive::ArchiveKind;
use cef_version::{Platform, PlatformTarget, VersionDescriptor};

use crate::http::{HttpClient, HttpError, Progress};

/// CEF automated-build CDN
pub const CDN_BASE_URL: &str = "https://cef-builds.spotifycdn.com";

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download of {url} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: HttpError,
    },

    #[error("download of {url} failed: {source}")]
    Permanent {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Archive format the CDN ships for `platform`
pub fn archive_kind(platform: Platform) -> ArchiveKind {
    match platform {
        Platform::Windows => ArchiveKind::Zip,
        Platform::Macos | Platform::Linux => ArchiveKind::TarBz2,
    }
}

/// Distribution file name (unencoded)
pub fn distribution_file_name(version: &VersionDescriptor, target: PlatformTarget) -> String {
    format!(
        "cef_binary_{}_{}_minimal.{}",
        version,
        target.cdn_name(),
        archive_kind(target.platform).extension()
    )
}

/// Top-level directory name inside a distribution archive
pub fn distribution_dir_name(version: &VersionDescriptor, target: PlatformTarget) -> String {
    format!("cef_binary_{}_{}_minimal", version, target.cdn_name())
}

/// Download URL for `version` on `target` under `base`
pub fn cdn_url(base: &str, version: &VersionDescriptor, target: PlatformTarget) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        distribution_file_name(version, target).replace('+', "%2B")
    )
}

/// A downloaded (or, under dry-run, resolved) distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadArtifact {
    pub url: String,
    /// None under dry-run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Actual size, or the advertised size under dry-run when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Always true: the source publishes nothing to verify against
    pub checksum_unverified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// CDN downloader
pub struct Downloader {
    http: Arc<dyn HttpClient>,
    base_url: String,
    policy: RetryPolicy,
}

impl Downloader {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            base_url: CDN_BASE_URL.to_string(),
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

    pub fn url_for(&self, version: &VersionDescriptor, target: PlatformTarget) -> String {
        cdn_url(&self.base_url, version, target)
    }

    /// Download the distribution for `version`/`target` into `dest_dir`
    pub fn download(
        &self,
        version: &VersionDescriptor,
        target: PlatformTarget,
        dest_dir: &Path,
        dry_run: bool,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<DownloadArtifact, DownloadError> {
        let url = self.url_for(version, target);

        if dry_run {
            // Size estimate only; a failed HEAD leaves it unknown
            let size_bytes = self
                .http
                .content_length(&url)
                .map_err(|e| tracing::debug!(error = %e, "size estimate unavailable"))
                .ok()
                .flatten();
            tracing::info!(url = %url, size_bytes = ?size_bytes, "[dry-run] would download");
            return Ok(DownloadArtifact {
                url,
                local_path: None,
                size_bytes,
                checksum_unverified: true,
                sha256: None,
            });
        }

        let dest = dest_dir.join(distribution_file_name(version, target));
        tracing::info!(url = %url, dest = %dest.display(), "downloading CEF distribution");
        let fetched = fetch_to_file(self.http.as_ref(), &url, &dest, &self.policy, progress)?;
        tracing::warn!(
            sha256 = %fetched.sha256,
            "no published checksum for CEF distributions, integrity not verified"
        );

        Ok(DownloadArtifact {
            url,
            local_path: Some(fetched.path),
            size_bytes: Some(fetched.size_bytes),
            checksum_unverified: true,
            sha256: Some(fetched.sha256),
        })
    }
}
