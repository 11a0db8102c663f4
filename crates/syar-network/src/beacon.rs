//! Beacon primitive
//!
//! Fire-and-forget POST. The return value only says whether the data was
//! queued; delivery is never reported.

use crate::client::FetchRequest;
use crate::fetch::Fetch;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::Method;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace};
use url::Url;

/// Default queued payload limit (64 KiB)
pub const DEFAULT_BEACON_LIMIT: usize = 64 * 1024;

/// The beacon primitive. Never fails loudly.
pub trait Beacon: Send + Sync {
    /// Queue `data` for delivery to `url`. Returns `true` if queued.
    fn send_beacon(&self, url: &str, data: Option<Bytes>) -> bool;
}

/// Beacon that posts through a fetch primitive in the background
pub struct HttpBeacon {
    fetch: Arc<dyn Fetch>,
    runtime: Handle,
    max_payload: usize,
}

impl HttpBeacon {
    pub fn new(fetch: Arc<dyn Fetch>, runtime: Handle) -> Self {
        Self {
            fetch,
            runtime,
            max_payload: DEFAULT_BEACON_LIMIT,
        }
    }

    pub fn with_limit(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

impl Beacon for HttpBeacon {
    fn send_beacon(&self, url: &str, data: Option<Bytes>) -> bool {
        let target = match Url::parse(url) {
            Ok(target) if matches!(target.scheme(), "http" | "https") => target,
            _ => {
                debug!("Beacon target rejected: {}", url);
                return false;
            }
        };

        let body = data.unwrap_or_default();
        if body.len() > self.max_payload {
            debug!("Beacon payload too large: {} > {}", body.len(), self.max_payload);
            return false;
        }

        let request = FetchRequest::new(Method::POST, target.as_str())
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain;charset=UTF-8"))
            .with_body(body);
        let future = self.fetch.fetch(request);

        self.runtime.spawn(async move {
            if let Err(e) = future.await {
                trace!("Beacon delivery failed: {}", e);
            }
        });
        true
    }
}
