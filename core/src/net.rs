use std::io::Read;

use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, CONTENT_LENGTH, ETAG, RANGE};

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub total_bytes: Option<u64>,
    pub etag: Option<String>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

pub struct RangeResponse {
    pub status_code: u16,
    pub body: Box<dyn Read + Send>,
}

impl RangeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Transport used by the resolver and the chunk workers.
pub trait NetClient: Send + Sync {
    fn head(&self, url: &str) -> CoreResult<ProbeResponse>;
    /// GET `url` restricted to the inclusive byte range `start..=end`.
    fn get_range(&self, url: &str, start: u64, end: u64) -> CoreResult<RangeResponse>;
}

#[derive(Clone)]
pub struct ReqwestNetClient {
    client: Client,
}

impl ReqwestNetClient {
    pub fn new(config: &EngineConfig) -> CoreResult<Self> {
        // `None` lifts the blocking client's default 30s total timeout.
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| CoreError::Network(err.to_string()))?;
        Ok(Self { client })
    }
}

impl NetClient for ReqwestNetClient {
    fn head(&self, url: &str) -> CoreResult<ProbeResponse> {
        let resp = self
            .client
            .head(url)
            .send()
            .map_err(|err| CoreError::Network(format!("request for {} failed: {}", url, err)))?;
        let headers = resp.headers();
        let total_bytes = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let etag = headers
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        Ok(ProbeResponse {
            status_code: resp.status().as_u16(),
            total_bytes,
            etag,
        })
    }

    fn get_range(&self, url: &str, start: u64, end: u64) -> CoreResult<RangeResponse> {
        let range = HeaderValue::from_str(&format!("bytes={}-{}", start, end))
            .map_err(|err| CoreError::Network(err.to_string()))?;
        let resp = self
            .client
            .get(url)
            .header(RANGE, range)
            .send()
            .map_err(|err| CoreError::Network(format!("request for {} failed: {}", url, err)))?;
        Ok(RangeResponse {
            status_code: resp.status().as_u16(),
            body: Box::new(resp),
        })
    }
}
