//! Request object primitive
//!
//! Callback-style request with separate `open` and `send` phases. The
//! outcome is delivered through events (`readystatechange`, then `load`,
//! `error` or `abort`, then `loadend`) on a later turn of the task queue.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut request = factory.create();
//! request.events().add_listener(RequestEventKind::Load, |e| println!("{}", e.snapshot.status));
//! request.open(Method::GET, "https://example.com/");
//! request.send(None);
//! queue.run_until_idle();
//! ```

use crate::client::{FetchRequest, HttpError, Response};
use crate::event_loop::TaskQueue;
use crate::events::{Event, EventTarget};
use crate::fetch::Fetch;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::Method;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle of a request object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    #[default]
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

/// Events a request object raises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestEventKind {
    ReadyStateChange,
    Load,
    Error,
    Abort,
    LoadEnd,
}

/// Observable state of a request object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub ready_state: ReadyState,
    pub status: u16,
    pub status_text: String,
    pub response_text: String,
    pub response_url: String,
}

impl RequestSnapshot {
    /// Final state for a received response
    pub fn from_response(response: &Response) -> Self {
        Self {
            ready_state: ReadyState::Done,
            status: response.status.as_u16(),
            status_text: response.status.canonical_reason().unwrap_or_default().to_string(),
            response_text: String::from_utf8_lossy(&response.body).into_owned(),
            response_url: response.final_url.clone(),
        }
    }

    /// Final state for a network failure (status 0, empty body)
    pub fn network_error() -> Self {
        Self {
            ready_state: ReadyState::Done,
            ..Self::default()
        }
    }
}

/// An event together with the object's state when it was raised
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub kind: RequestEventKind,
    pub snapshot: RequestSnapshot,
}

impl Event for RequestEvent {
    type Kind = RequestEventKind;

    fn kind(&self) -> RequestEventKind {
        self.kind
    }
}

/// Raise the closing event sequence: `readystatechange`, `terminal`, `loadend`
pub fn dispatch_final_events(
    events: &EventTarget<RequestEvent>,
    snapshot: &RequestSnapshot,
    terminal: RequestEventKind,
) {
    for kind in [RequestEventKind::ReadyStateChange, terminal, RequestEventKind::LoadEnd] {
        events.dispatch(&RequestEvent {
            kind,
            snapshot: snapshot.clone(),
        });
    }
}

/// The request object primitive
pub trait HttpRequestObject: Send {
    /// Set the target. Raises `readystatechange` synchronously.
    fn open(&mut self, method: Method, url: &str);

    fn set_request_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Start the request; the outcome arrives as deferred events
    fn send(&mut self, body: Option<Bytes>);

    /// Cancel an in-flight request
    fn abort(&mut self);

    fn snapshot(&self) -> RequestSnapshot;

    fn events(&self) -> &EventTarget<RequestEvent>;
}

/// Constructor for request objects
pub trait HttpRequestFactory: Send + Sync {
    fn create(&self) -> Box<dyn HttpRequestObject>;
}

/// Request object that performs I/O through a fetch primitive
pub struct NetworkRequest {
    fetch: Arc<dyn Fetch>,
    runtime: Handle,
    queue: TaskQueue,
    events: EventTarget<RequestEvent>,
    state: Arc<Mutex<RequestSnapshot>>,
    pending: Option<FetchRequest>,
    in_flight: Option<JoinHandle<()>>,
    /// Set by `abort`, checked by the completion task
    cancelled: Arc<AtomicBool>,
}

impl NetworkRequest {
    pub fn new(fetch: Arc<dyn Fetch>, runtime: Handle, queue: TaskQueue) -> Self {
        Self {
            fetch,
            runtime,
            queue,
            events: EventTarget::new(),
            state: Arc::new(Mutex::new(RequestSnapshot::default())),
            pending: None,
            in_flight: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn set_state(&self, snapshot: RequestSnapshot) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn complete(
        result: Result<Response, HttpError>,
        state: &Mutex<RequestSnapshot>,
        events: &EventTarget<RequestEvent>,
    ) {
        let (snapshot, terminal) = match result {
            Ok(response) => (RequestSnapshot::from_response(&response), RequestEventKind::Load),
            Err(e) => {
                debug!("Request failed: {}", e);
                (RequestSnapshot::network_error(), RequestEventKind::Error)
            }
        };

        *state.lock().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        dispatch_final_events(events, &snapshot, terminal);
    }
}

impl HttpRequestObject for NetworkRequest {
    fn open(&mut self, method: Method, url: &str) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        // A completion already posted to the queue belongs to the previous open
        self.cancelled.store(true, Ordering::Release);
        self.cancelled = Arc::new(AtomicBool::new(false));
        self.pending = Some(FetchRequest::new(method, url));

        let snapshot = RequestSnapshot {
            ready_state: ReadyState::Opened,
            ..RequestSnapshot::default()
        };
        self.set_state(snapshot.clone());
        self.events.dispatch(&RequestEvent {
            kind: RequestEventKind::ReadyStateChange,
            snapshot,
        });
    }

    fn set_request_header(&mut self, name: HeaderName, value: HeaderValue) {
        match self.pending.as_mut() {
            Some(request) => {
                request.headers.append(name, value);
            }
            None => warn!("set_request_header called before open"),
        }
    }

    fn send(&mut self, body: Option<Bytes>) {
        let Some(mut request) = self.pending.take() else {
            warn!("send called without open");
            return;
        };
        request.body = body;

        let future = self.fetch.fetch(request);
        let queue = self.queue.clone();
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let cancelled = Arc::clone(&self.cancelled);

        self.in_flight = Some(self.runtime.spawn(async move {
            let result = future.await;
            queue.post(move || {
                if cancelled.load(Ordering::Acquire) {
                    return;
                }
                Self::complete(result, &state, &events);
            });
        }));
    }

    fn abort(&mut self) {
        let Some(handle) = self.in_flight.take() else {
            self.pending = None;
            self.set_state(RequestSnapshot::default());
            return;
        };

        handle.abort();
        self.cancelled.store(true, Ordering::Release);

        let snapshot = RequestSnapshot::network_error();
        self.set_state(snapshot.clone());
        dispatch_final_events(&self.events, &snapshot, RequestEventKind::Abort);
        self.set_state(RequestSnapshot::default());
    }

    fn snapshot(&self) -> RequestSnapshot {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn events(&self) -> &EventTarget<RequestEvent> {
        &self.events
    }
}

/// Creates [`NetworkRequest`] objects sharing one fetch, runtime and queue
#[derive(Clone)]
pub struct NetworkRequestFactory {
    fetch: Arc<dyn Fetch>,
    runtime: Handle,
    queue: TaskQueue,
}

impl NetworkRequestFactory {
    pub fn new(fetch: Arc<dyn Fetch>, runtime: Handle, queue: TaskQueue) -> Self {
        Self { fetch, runtime, queue }
    }
}

impl HttpRequestFactory for NetworkRequestFactory {
    fn create(&self) -> Box<dyn HttpRequestObject> {
        Box::new(NetworkRequest::new(
            Arc::clone(&self.fetch),
            self.runtime.clone(),
            self.queue.clone(),
        ))
    }
}
