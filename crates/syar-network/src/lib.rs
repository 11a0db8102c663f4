//! Syar Network Layer
//!
//! The network primitives a hosted process issues requests through, and
//! the bindings table that hands them out.
//!
//! Primitives:
//! 1. [`Fetch`] → future resolving to a response or rejecting with an error
//! 2. [`HttpRequestObject`] → open/send, outcome delivered as deferred events
//! 3. [`SocketConnector`] → synchronous construction, background connection
//! 4. [`Beacon`] → fire-and-forget, `bool` result
//! 5. [`ResourceLoader`] → attribute write that starts a load, no error channel
//!
//! Deferred notifications run on the host's [`TaskQueue`].

mod beacon;
mod bindings;
mod client;
mod event_loop;
mod events;
mod fetch;
mod loader;
mod request;
mod socket;

pub use beacon::{Beacon, HttpBeacon, DEFAULT_BEACON_LIMIT};
pub use bindings::{Bindings, Primitive, Slot};
pub use client::{FetchRequest, HttpClient, HttpClientConfig, HttpError, Response};
pub use event_loop::{Task, TaskQueue};
pub use events::{Event, EventTarget, Listener};
pub use fetch::{Fetch, FetchFuture, HttpFetch};
pub use loader::{
    is_load_attribute, load_targets, Element, FetchLoader, LoadEvent, LoadEventKind, ResourceLoader,
    LOAD_ATTRIBUTES,
};
pub use request::{
    dispatch_final_events, HttpRequestFactory, HttpRequestObject, NetworkRequest, NetworkRequestFactory, ReadyState,
    RequestEvent, RequestEventKind, RequestSnapshot,
};
pub use socket::{SocketConnector, SocketError, SocketEvent, SocketEventKind, SocketState, StreamSocket, TcpSocketConnector};

/// Re-exported HTTP types used in primitive signatures
pub use hyper::body::Bytes;
pub use hyper::header::{HeaderMap, HeaderName, HeaderValue};
pub use hyper::{Method, StatusCode};
