//! Retrying file fetch shared by the CEF and CMake downloads

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::{HttpClient, HttpError, Progress};

use super::DownloadError;

/// Retry policy for transient network failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each time
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Retries without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// A file fetched to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Hex SHA-256 of the received bytes
    pub sha256: String,
    pub attempts: u32,
}

/// Writer that hashes everything passing through it
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Path of the in-progress file for `dest`
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Fetch `url` to `dest` through `<dest>.part`.
///
/// Transient failures are retried per `policy`; the partial file is removed
/// after every failed attempt, so `dest` only ever appears complete.
pub fn fetch_to_file(
    http: &dyn HttpClient,
    url: &str,
    dest: &Path,
    policy: &RetryPolicy,
    progress: &mut dyn FnMut(Progress),
) -> Result<FetchedFile, DownloadError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| DownloadError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let part = partial_path(dest);
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch_once(http, url, &part, progress) {
            Ok((size_bytes, sha256)) => {
                fs::rename(&part, dest).map_err(|source| {
                    let _ = fs::remove_file(&part);
                    DownloadError::Io {
                        path: dest.to_path_buf(),
                        source,
                    }
                })?;
                tracing::info!(url, path = %dest.display(), size_bytes, attempt, "download complete");
                return Ok(FetchedFile {
                    path: dest.to_path_buf(),
                    size_bytes,
                    sha256,
                    attempts: attempt,
                });
            }
            Err(FetchFailure::Local(source)) => {
                let _ = fs::remove_file(&part);
                return Err(DownloadError::Io { path: part, source });
            }
            Err(FetchFailure::Http(error)) => {
                let _ = fs::remove_file(&part);
                if !error.is_transient() {
                    return Err(DownloadError::Permanent {
                        url: url.to_string(),
                        source: error,
                    });
                }
                if attempt >= max_attempts {
                    return Err(DownloadError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        source: error,
                    });
                }
                let delay = policy.delay_after(attempt);
                tracing::warn!(url, attempt, error = %error, delay_ms = delay.as_millis() as u64, "transient download failure, retrying");
                std::thread::sleep(delay);
            }
        }
    }
}

enum FetchFailure {
    Http(HttpError),
    Local(io::Error),
}

fn fetch_once(
    http: &dyn HttpClient,
    url: &str,
    part: &Path,
    progress: &mut dyn FnMut(Progress),
) -> Result<(u64, String), FetchFailure> {
    let file = File::create(part).map_err(FetchFailure::Local)?;
    let mut writer = HashingWriter {
        inner: BufWriter::new(file),
        hasher: Sha256::new(),
    };
    let size = http
        .download(url, &mut writer, progress)
        .map_err(FetchFailure::Http)?;
    writer.flush().map_err(FetchFailure::Local)?;
    Ok((size, hex::encode(writer.hasher.finalize())))
}
