//! Fetch primitive
//!
//! Promise-style single-shot request: the call returns a future that
//! resolves with a response or rejects with an [`HttpError`].

use crate::client::{FetchRequest, HttpClient, HttpError, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Pending fetch result
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Response, HttpError>> + Send + 'static>>;

/// The fetch primitive
pub trait Fetch: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> FetchFuture;
}

/// Fetch backed by the real HTTP client
#[derive(Clone)]
pub struct HttpFetch {
    client: Arc<HttpClient>,
}

impl HttpFetch {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

impl Default for HttpFetch {
    fn default() -> Self {
        Self::new(Arc::new(HttpClient::with_defaults()))
    }
}

impl Fetch for HttpFetch {
    fn fetch(&self, request: FetchRequest) -> FetchFuture {
        let client = Arc::clone(&self.client);
        Box::pin(async move { client.execute(request).await })
    }
}
