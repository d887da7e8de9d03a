//! Scripted in-memory transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use md5::{Digest, Md5};

use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use crate::net::{NetClient, ProbeResponse, RangeResponse};

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Status(u16),
    Transport,
    ShortBody,
}

#[derive(Default)]
struct FakeSource {
    probe: Option<ProbeResponse>,
    content: Vec<u8>,
    failures: HashMap<u64, VecDeque<Failure>>,
}

#[derive(Default)]
struct FakeState {
    sources: HashMap<String, FakeSource>,
    get_count: usize,
    head_count: usize,
    served: Vec<(String, u64, u64)>,
    requested_at: Vec<Instant>,
    cancel_after_head: Option<CancelToken>,
}

#[derive(Clone, Default)]
pub struct FakeNet {
    state: Arc<Mutex<FakeState>>,
}

pub fn pattern(size: u64) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

impl FakeNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(self, url: &str, size: u64, etag: Option<&str>) -> Self {
        self.with_content(url, pattern(size), etag)
    }

    pub fn with_content(self, url: &str, content: Vec<u8>, etag: Option<&str>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.sources.insert(
                url.to_string(),
                FakeSource {
                    probe: Some(ProbeResponse {
                        status_code: 200,
                        total_bytes: Some(content.len() as u64),
                        etag: etag.map(str::to_string),
                    }),
                    content,
                    failures: HashMap::new(),
                },
            );
        }
        self
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .sources
            .insert(url.to_string(), FakeSource::default());
        self
    }

    /// Queues one failure for the next GET of the range starting at `start`.
    pub fn fail_range(self, url: &str, start: u64, failure: Failure) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let source = state.sources.entry(url.to_string()).or_default();
            source.failures.entry(start).or_default().push_back(failure);
        }
        self
    }

    /// Cancels `token` once the first HEAD has been answered.
    pub fn cancel_after_head(self, token: CancelToken) -> Self {
        self.state.lock().unwrap().cancel_after_head = Some(token);
        self
    }

    pub fn shared(&self) -> Arc<dyn NetClient> {
        Arc::new(self.clone())
    }

    pub fn get_count(&self) -> usize {
        self.state.lock().unwrap().get_count
    }

    pub fn head_count(&self) -> usize {
        self.state.lock().unwrap().head_count
    }

    /// When each GET arrived, in order.
    pub fn requested_at(&self) -> Vec<Instant> {
        self.state.lock().unwrap().requested_at.clone()
    }

    pub fn served(&self) -> Vec<(String, u64, u64)> {
        self.state.lock().unwrap().served.clone()
    }
}

impl NetClient for FakeNet {
    fn head(&self, url: &str) -> CoreResult<ProbeResponse> {
        let mut state = self.state.lock().unwrap();
        state.head_count += 1;
        if let Some(token) = &state.cancel_after_head {
            token.cancel();
        }
        state
            .sources
            .get(url)
            .and_then(|source| source.probe.clone())
            .ok_or_else(|| CoreError::Network(format!("connection refused: {}", url)))
    }

    fn get_range(&self, url: &str, start: u64, end: u64) -> CoreResult<RangeResponse> {
        let mut state = self.state.lock().unwrap();
        state.get_count += 1;
        state.served.push((url.to_string(), start, end));
        state.requested_at.push(Instant::now());
        let source = match state.sources.get_mut(url) {
            Some(source) if source.probe.is_some() => source,
            _ => return Err(CoreError::Network(format!("connection refused: {}", url))),
        };

        let failure = source
            .failures
            .get_mut(&start)
            .and_then(|queue| queue.pop_front());
        let last = (end as usize).min(source.content.len().saturating_sub(1));
        let mut body = source.content[start as usize..=last].to_vec();
        match failure {
            Some(Failure::Status(code)) => Ok(RangeResponse {
                status_code: code,
                body: Box::new(Cursor::new(Vec::new())),
            }),
            Some(Failure::Transport) => {
                Err(CoreError::Network(format!("connection reset: {}", url)))
            }
            Some(Failure::ShortBody) => {
                body.pop();
                Ok(RangeResponse {
                    status_code: 206,
                    body: Box::new(Cursor::new(body)),
                })
            }
            None => Ok(RangeResponse {
                status_code: 206,
                body: Box::new(Cursor::new(body)),
            }),
        }
    }
}
