use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use crate::net::NetClient;

pub type SourceId = usize;

/// One usable mirror, bound to the transport that probed it.
#[derive(Clone)]
pub struct Connection {
    pub id: SourceId,
    pub url: String,
    pub net: Arc<dyn NetClient>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("url", &self.url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RejectedSource {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pub size: u64,
    pub checksum: Option<String>,
    pub connections: Vec<Connection>,
    pub rejected: Vec<RejectedSource>,
}

impl Attributes {
    fn reject(&mut self, url: &str, reason: String) {
        warn!(url, %reason, "ignoring source");
        self.rejected.push(RejectedSource {
            url: url.to_string(),
            reason,
        });
    }
}

/// Turns an `ETag` header into a comparable checksum.
///
/// Weak validators abort the run. Multipart tokens such as `"<hex>-12"` are
/// digests of digests and are reported as unknown.
pub fn parse_etag(url: &str, etag: &str) -> CoreResult<Option<String>> {
    let etag = etag.trim();
    if etag.starts_with("W/") {
        return Err(CoreError::WeakValidator {
            url: url.to_string(),
        });
    }

    let checksum = etag.trim_matches('"');
    if checksum.is_empty() || is_composite(checksum) {
        return Ok(None);
    }
    Ok(Some(checksum.to_string()))
}

fn is_composite(checksum: &str) -> bool {
    match checksum.rsplit_once('-') {
        Some((_, suffix)) => !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Probes every URL in order and keeps the ones that agree with the first
/// responsive source on size and checksum. The token is checked before each
/// probe.
pub fn resolve_sources(
    urls: &[String],
    net: Arc<dyn NetClient>,
    cancel: &CancelToken,
) -> CoreResult<Attributes> {
    let mut attributes = Attributes::default();
    let mut reference_size: Option<u64> = None;

    for url in urls {
        if cancel.is_canceled() {
            return Err(CoreError::Canceled);
        }
        let probe = match net.head(url) {
            Ok(probe) => probe,
            Err(err) => {
                attributes.reject(url, format!("head request failed: {}", err));
                continue;
            }
        };
        if !probe.is_success() {
            attributes.reject(
                url,
                format!("head request failed with status {}", probe.status_code),
            );
            continue;
        }
        let Some(size) = probe.total_bytes else {
            attributes.reject(url, "no Content-Length in head response".to_string());
            continue;
        };
        let checksum = match probe.etag.as_deref() {
            Some(etag) => parse_etag(url, etag)?,
            None => None,
        };
        debug!(url, size, checksum = ?checksum, "probed source");

        let checksum_conflict = matches!(
            (&attributes.checksum, &checksum),
            (Some(reference), Some(candidate)) if reference != candidate
        );
        if checksum_conflict {
            attributes.reject(
                url,
                "checksum does not match what was found on previous url".to_string(),
            );
            continue;
        }
        if let Some(reference) = reference_size {
            if reference != size {
                attributes.reject(
                    url,
                    format!(
                        "size ({}) does not match what was found on previous url ({})",
                        size, reference
                    ),
                );
                continue;
            }
        }

        reference_size = Some(size);
        attributes.size = size;
        if attributes.checksum.is_none() {
            attributes.checksum = checksum;
        }
        attributes.connections.push(Connection {
            id: attributes.connections.len(),
            url: url.clone(),
            net: Arc::clone(&net),
        });
    }

    info!(
        size = attributes.size,
        connections = attributes.connections.len(),
        rejected = attributes.rejected.len(),
        "resolved sources"
    );
    Ok(attributes)
}
