//! HTTP seam
//!
//! Every network access (vulnerability queries, CDN and release downloads)
//! goes through [`HttpClient`] so phases can be exercised against
//! `mock::MockHttp` without a network.

use serde_json::Value;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Streaming progress snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub downloaded: u64,
    /// Content-Length when the server sent one
    pub total: Option<u64>,
}

/// HTTP client trait
pub trait HttpClient: Send + Sync {
    /// POST a JSON body and decode a JSON response
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, HttpError>;

    /// HEAD request; `Ok(None)` when the server sends no length
    fn content_length(&self, url: &str) -> Result<Option<u64>, HttpError>;

    /// GET `url` streaming the body into `sink`, returning bytes written
    fn download(
        &self,
        url: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<u64, HttpError>;
}

/// HTTP errors
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("transfer interrupted: {0}")]
    Interrupted(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("write failed: {0}")]
    Sink(#[source] io::Error),

    #[error("request failed: {0}")]
    Other(String),
}

impl HttpError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Connect(_) | HttpError::Timeout(_) | HttpError::Interrupted(_) => true,
            HttpError::Status { status, .. } => *status >= 500 || *status == 429,
            HttpError::Decode(_) | HttpError::Sink(_) | HttpError::Other(_) => false,
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HttpError::Timeout(e.to_string())
        } else if e.is_connect() {
            HttpError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            HttpError::Status {
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            HttpError::Decode(e.to_string())
        } else if e.is_body() {
            HttpError::Interrupted(e.to_string())
        } else {
            HttpError::Other(e.to_string())
        }
    }
}

/// Timeouts for the production client
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Applies to short requests (queries, HEAD)
    pub request_timeout: Duration,
    /// Applies to whole downloads
    pub download_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(1800),
        }
    }
}

/// Blocking reqwest client
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    config: HttpConfig,
}

impl ReqwestClient {
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }
}

impl HttpClient for ReqwestClient {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, HttpError> {
        let response = self
            .client
            .post(url)
            .timeout(self.config.request_timeout)
            .json(body)
            .send()?
            .error_for_status()?;
        Ok(response.json::<Value>()?)
    }

    fn content_length(&self, url: &str) -> Result<Option<u64>, HttpError> {
        let response = self
            .client
            .head(url)
            .timeout(self.config.request_timeout)
            .send()?
            .error_for_status()?;
        Ok(response.content_length())
    }

    fn download(
        &self,
        url: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<u64, HttpError> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.config.download_timeout)
            .send()?
            .error_for_status()?;

        let total = response.content_length();
        let mut buf = vec![0u8; 64 * 1024];
        let mut downloaded = 0u64;
        progress(Progress { downloaded, total });

        loop {
            let n = match response.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HttpError::Interrupted(e.to_string())),
            };
            sink.write_all(&buf[..n]).map_err(HttpError::Sink)?;
            downloaded += n as u64;
            progress(Progress { downloaded, total });
        }

        sink.flush().map_err(HttpError::Sink)?;
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(HttpError::Connect("refused".into()).is_transient());
        assert!(HttpError::Timeout("slow".into()).is_transient());
        assert!(HttpError::Status { url: "u".into(), status: 503 }.is_transient());
        assert!(HttpError::Status { url: "u".into(), status: 429 }.is_transient());
        assert!(!HttpError::Status { url: "u".into(), status: 404 }.is_transient());
        assert!(!HttpError::Decode("bad json".into()).is_transient());
        assert!(!HttpError::Sink(io::Error::new(io::ErrorKind::Other, "disk full")).is_transient());
    }

    #[test]
    fn test_default_timeouts() {
        let config = HttpConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.download_timeout > config.request_timeout);
    }
}
