//! Scripted HTTP client

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::http::{HttpClient, HttpError, Progress};

/// One queued download outcome for a URL
enum Scripted {
    /// Fail before writing anything
    Fail(HttpError),
    /// Write a prefix of the body, then fail
    Truncate { bytes: Vec<u8>, error: HttpError },
}

/// Mock HTTP client for tests
#[derive(Default)]
pub struct MockHttp {
    json_responses: Mutex<VecDeque<Result<Value, HttpError>>>,
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    scripted: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requested: Mutex<Vec<String>>,
    post_calls: AtomicUsize,
    head_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next `post_json` result (an empty queue answers `{}`)
    pub fn push_json(&self, response: Result<Value, HttpError>) {
        if let Ok(mut queue) = self.json_responses.lock() {
            queue.push_back(response);
        }
    }

    /// Serve `body` for every GET/HEAD of `url`
    pub fn serve(&self, url: impl Into<String>, body: Vec<u8>) {
        if let Ok(mut bodies) = self.bodies.lock() {
            bodies.insert(url.into(), body);
        }
    }

    /// Fail the next download of `url` before any byte is written
    pub fn fail_next_download(&self, url: impl Into<String>, error: HttpError) {
        self.script(url.into(), Scripted::Fail(error));
    }

    /// Write `bytes` then fail on the next download of `url`
    pub fn truncate_next_download(&self, url: impl Into<String>, bytes: Vec<u8>, error: HttpError) {
        self.script(url.into(), Scripted::Truncate { bytes, error });
    }

    fn script(&self, url: String, outcome: Scripted) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.entry(url).or_default().push_back(outcome);
        }
    }

    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    /// Every request of any kind
    pub fn total_calls(&self) -> usize {
        self.post_calls() + self.head_calls() + self.download_calls()
    }

    /// URLs requested, in order
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn note(&self, url: &str) {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(url.to_string());
        }
    }

    fn body(&self, url: &str) -> Option<Vec<u8>> {
        self.bodies.lock().ok().and_then(|b| b.get(url).cloned())
    }

    fn not_found(url: &str) -> HttpError {
        HttpError::Status {
            url: url.to_string(),
            status: 404,
        }
    }
}

impl HttpClient for MockHttp {
    fn post_json(&self, url: &str, _body: &Value) -> Result<Value, HttpError> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        self.note(url);
        self.json_responses
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Ok(Value::Object(Default::default())))
    }

    fn content_length(&self, url: &str) -> Result<Option<u64>, HttpError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        self.note(url);
        self.body(url)
            .map(|b| Some(b.len() as u64))
            .ok_or_else(|| Self::not_found(url))
    }

    fn download(
        &self,
        url: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<u64, HttpError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.note(url);

        let next = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut s| s.get_mut(url).and_then(|q| q.pop_front()));
        match next {
            Some(Scripted::Fail(error)) => return Err(error),
            Some(Scripted::Truncate { bytes, error }) => {
                sink.write_all(&bytes).map_err(HttpError::Sink)?;
                progress(Progress {
                    downloaded: bytes.len() as u64,
                    total: None,
                });
                return Err(error);
            }
            None => {}
        }

        let body = self.body(url).ok_or_else(|| Self::not_found(url))?;
        let total = Some(body.len() as u64);
        progress(Progress { downloaded: 0, total });
        let mut written = 0u64;
        for chunk in body.chunks(16 * 1024) {
            sink.write_all(chunk).map_err(HttpError::Sink)?;
            written += chunk.len() as u64;
            progress(Progress {
                downloaded: written,
                total,
            });
        }
        Ok(written)
    }
}
