//! Primitive bindings
//!
//! The table every piece of network-issuing code obtains its primitives
//! from. Each primitive lives in a [`Slot`] that can be replaced exactly
//! once and remembers what it replaced.

use crate::beacon::{Beacon, HttpBeacon};
use crate::client::{HttpClient, HttpClientConfig};
use crate::event_loop::TaskQueue;
use crate::fetch::{Fetch, HttpFetch};
use crate::loader::{FetchLoader, ResourceLoader};
use crate::request::{HttpRequestFactory, NetworkRequestFactory};
use crate::socket::{SocketConnector, TcpSocketConnector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, info};

static GLOBAL: OnceLock<Bindings> = OnceLock::new();

/// The guarded network primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Fetch,
    HttpRequest,
    Socket,
    Beacon,
    ResourceLoader,
}

impl Primitive {
    pub const ALL: [Primitive; 5] = [
        Primitive::Fetch,
        Primitive::HttpRequest,
        Primitive::Socket,
        Primitive::Beacon,
        Primitive::ResourceLoader,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::HttpRequest => "http_request",
            Self::Socket => "socket",
            Self::Beacon => "beacon",
            Self::ResourceLoader => "resource_loader",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A replaceable binding.
///
/// The first replacement captures the binding it replaces as the original;
/// later replacements are ignored until the original is restored.
pub struct Slot<T: ?Sized> {
    current: RwLock<Arc<T>>,
    /// `Some` once replaced; doubles as the installation flag
    original: Mutex<Option<Arc<T>>>,
}

impl<T: ?Sized> Slot<T> {
    pub fn new(binding: Arc<T>) -> Self {
        Self {
            current: RwLock::new(binding),
            original: Mutex::new(None),
        }
    }

    /// The active binding
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn is_replaced(&self) -> bool {
        self.original.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// The binding captured by the first replacement
    pub fn original(&self) -> Option<Arc<T>> {
        self.original.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the binding with `wrap(current)` unless already replaced.
    /// Returns whether a replacement happened.
    pub fn replace_once<F>(&self, wrap: F) -> bool
    where
        F: FnOnce(Arc<T>) -> Arc<T>,
    {
        let mut original = self.original.lock().unwrap_or_else(PoisonError::into_inner);
        if original.is_some() {
            return false;
        }

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let pristine = Arc::clone(&current);
        *current = wrap(Arc::clone(&pristine));
        *original = Some(pristine);
        true
    }

    /// Put the original binding back. Returns whether anything was restored.
    pub fn restore(&self) -> bool {
        let mut original = self.original.lock().unwrap_or_else(PoisonError::into_inner);
        match original.take() {
            Some(pristine) => {
                *self.current.write().unwrap_or_else(PoisonError::into_inner) = pristine;
                true
            }
            None => false,
        }
    }
}

/// The process's network primitives
pub struct Bindings {
    queue: TaskQueue,
    fetch: Slot<dyn Fetch>,
    http_request: Slot<dyn HttpRequestFactory>,
    socket: Slot<dyn SocketConnector>,
    beacon: Slot<dyn Beacon>,
    loader: Slot<dyn ResourceLoader>,
}

impl Bindings {
    pub fn new(
        queue: TaskQueue,
        fetch: Arc<dyn Fetch>,
        http_request: Arc<dyn HttpRequestFactory>,
        socket: Arc<dyn SocketConnector>,
        beacon: Arc<dyn Beacon>,
        loader: Arc<dyn ResourceLoader>,
    ) -> Self {
        Self {
            queue,
            fetch: Slot::new(fetch),
            http_request: Slot::new(http_request),
            socket: Slot::new(socket),
            beacon: Slot::new(beacon),
            loader: Slot::new(loader),
        }
    }

    /// Real primitives over one HTTP client, runtime and task queue.
    ///
    /// The request object, beacon and loader talk to the network through
    /// their own handle on the client, not through the `fetch` binding.
    pub fn network(runtime: Handle, queue: TaskQueue, config: HttpClientConfig) -> Self {
        let client = Arc::new(HttpClient::new(config));
        let transport: Arc<dyn Fetch> = Arc::new(HttpFetch::new(Arc::clone(&client)));

        info!("Network primitives created");
        Self::new(
            queue.clone(),
            Arc::new(HttpFetch::new(client)),
            Arc::new(NetworkRequestFactory::new(
                Arc::clone(&transport),
                runtime.clone(),
                queue.clone(),
            )),
            Arc::new(TcpSocketConnector::new(runtime.clone(), queue.clone())),
            Arc::new(HttpBeacon::new(Arc::clone(&transport), runtime.clone())),
            Arc::new(FetchLoader::new(transport, runtime, queue)),
        )
    }

    /// Make these bindings the process-wide table. Fails (returning them
    /// back) if a table is already set.
    pub fn install_global(self) -> Result<&'static Bindings, Bindings> {
        GLOBAL.set(self)?;
        debug!("Process-wide bindings set");
        Ok(GLOBAL.get().expect("GLOBAL was just set"))
    }

    /// The process-wide table, if set
    pub fn global() -> Option<&'static Bindings> {
        GLOBAL.get()
    }

    /// The host's task queue, shared by every deferred notification
    pub fn task_queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn fetch(&self) -> Arc<dyn Fetch> {
        self.fetch.get()
    }

    pub fn http_request(&self) -> Arc<dyn HttpRequestFactory> {
        self.http_request.get()
    }

    pub fn socket(&self) -> Arc<dyn SocketConnector> {
        self.socket.get()
    }

    pub fn beacon(&self) -> Arc<dyn Beacon> {
        self.beacon.get()
    }

    pub fn loader(&self) -> Arc<dyn ResourceLoader> {
        self.loader.get()
    }

    pub fn fetch_slot(&self) -> &Slot<dyn Fetch> {
        &self.fetch
    }

    pub fn http_request_slot(&self) -> &Slot<dyn HttpRequestFactory> {
        &self.http_request
    }

    pub fn socket_slot(&self) -> &Slot<dyn SocketConnector> {
        &self.socket
    }

    pub fn beacon_slot(&self) -> &Slot<dyn Beacon> {
        &self.beacon
    }

    pub fn loader_slot(&self) -> &Slot<dyn ResourceLoader> {
        &self.loader
    }

    /// Installation flag for one primitive
    pub fn is_replaced(&self, primitive: Primitive) -> bool {
        match primitive {
            Primitive::Fetch => self.fetch.is_replaced(),
            Primitive::HttpRequest => self.http_request.is_replaced(),
            Primitive::Socket => self.socket.is_replaced(),
            Primitive::Beacon => self.beacon.is_replaced(),
            Primitive::ResourceLoader => self.loader.is_replaced(),
        }
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Bindings");
        for primitive in Primitive::ALL {
            s.field(primitive.as_str(), &self.is_replaced(primitive));
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Plain;

    impl Greeter for Plain {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    struct Loud(Arc<dyn Greeter>);

    impl Greeter for Loud {
        fn greet(&self) -> String {
            self.0.greet().to_uppercase()
        }
    }

    #[test]
    fn test_slot_replaces_once() {
        let pristine: Arc<dyn Greeter> = Arc::new(Plain);
        let slot: Slot<dyn Greeter> = Slot::new(Arc::clone(&pristine));
        assert!(!slot.is_replaced());

        assert!(slot.replace_once(|inner| Arc::new(Loud(inner))));
        assert!(!slot.replace_once(|inner| Arc::new(Loud(inner))));

        // Exactly one layer
        assert_eq!(slot.get().greet(), "HELLO");
        assert!(Arc::ptr_eq(&slot.original().unwrap(), &pristine));
    }

    #[test]
    fn test_slot_restore() {
        let pristine: Arc<dyn Greeter> = Arc::new(Plain);
        let slot: Slot<dyn Greeter> = Slot::new(Arc::clone(&pristine));

        assert!(!slot.restore());
        slot.replace_once(|inner| Arc::new(Loud(inner)));
        assert!(slot.restore());
        assert!(Arc::ptr_eq(&slot.get(), &pristine));
        assert!(!slot.is_replaced());

        // Can be replaced again after restore
        assert!(slot.replace_once(|inner| Arc::new(Loud(inner))));
    }
}
