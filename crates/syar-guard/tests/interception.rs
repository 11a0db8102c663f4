//! End-to-end interception through real bindings over a counting transport

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use syar_guard::{activate, Activation, FetchBlockMode, GuardConfig, NetworkGuard};
use syar_network::{
    Bindings, Bytes, Element, EventTarget, Fetch, FetchFuture, FetchLoader, FetchRequest, HttpBeacon, HttpError,
    Method, NetworkRequestFactory, Primitive, ReadyState, RequestEvent, RequestEventKind, Response, SocketConnector,
    SocketError, SocketEvent, SocketState, StatusCode, StreamSocket, TaskQueue,
};
use syar_policy::{Outcome, PatternConfig, PolicyConfig, RuleKind};
use tokio::runtime::Runtime;
use url::Url;

/// Transport answering 200 locally and counting every call
#[derive(Default)]
struct CountingFetch {
    calls: AtomicUsize,
}

impl Fetch for CountingFetch {
    fn fetch(&self, request: FetchRequest) -> FetchFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::ready(Ok(Response::synthetic(
            StatusCode::OK,
            "text/plain",
            b"origin".to_vec(),
            &request.url,
        ))))
    }
}

struct IdleSocket {
    url: String,
    events: EventTarget<SocketEvent>,
}

impl StreamSocket for IdleSocket {
    fn url(&self) -> &str {
        &self.url
    }

    fn state(&self) -> SocketState {
        SocketState::Connecting
    }

    fn send(&self, _data: Bytes) -> Result<(), SocketError> {
        Err(SocketError::NotOpen)
    }

    fn close(&self) {}

    fn events(&self) -> &EventTarget<SocketEvent> {
        &self.events
    }
}

/// Connector handing out one shared socket
struct CountingConnector {
    calls: AtomicUsize,
    socket: Arc<dyn StreamSocket>,
}

impl SocketConnector for CountingConnector {
    fn connect(&self, _url: &str) -> Result<Arc<dyn StreamSocket>, SocketError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.socket))
    }
}

struct Harness {
    runtime: Runtime,
    queue: TaskQueue,
    transport: Arc<CountingFetch>,
    connector: Arc<CountingConnector>,
    bindings: Bindings,
}

impl Harness {
    fn new() -> Self {
        let runtime = Runtime::new().unwrap();
        let queue = TaskQueue::new();
        let transport = Arc::new(CountingFetch::default());
        let connector = Arc::new(CountingConnector {
            calls: AtomicUsize::new(0),
            socket: Arc::new(IdleSocket {
                url: "tcp://example.com:7000".into(),
                events: EventTarget::new(),
            }),
        });

        let handle = runtime.handle().clone();
        let bindings = Bindings::new(
            queue.clone(),
            transport.clone(),
            Arc::new(NetworkRequestFactory::new(transport.clone(), handle.clone(), queue.clone())),
            connector.clone(),
            Arc::new(HttpBeacon::new(transport.clone(), handle.clone())),
            Arc::new(FetchLoader::new(transport.clone(), handle, queue.clone())),
        );

        Self {
            runtime,
            queue,
            transport,
            connector,
            bindings,
        }
    }

    fn transport_calls(&self) -> usize {
        self.transport.calls.load(Ordering::SeqCst)
    }
}

fn scenario_policy() -> PolicyConfig {
    PolicyConfig {
        allow: vec!["sheets.googleapis.com".into()],
        block_hosts: vec!["api.automa.site".into()],
        block_patterns: vec![PatternConfig::Plain("https://www.googleapis.com/drive/v3/files.*".into())],
        block_keywords: Vec::new(),
    }
}

fn guard(mode: FetchBlockMode) -> NetworkGuard {
    let config = GuardConfig {
        policy: scenario_policy(),
        fetch_block_mode: mode,
        ..GuardConfig::default()
    };
    NetworkGuard::from_config(&config, None).unwrap()
}

#[test]
fn test_end_to_end_classification() {
    let guard = guard(FetchBlockMode::Reject);

    let decision = guard.classify("https://api.automa.site/ping");
    assert_eq!(decision.outcome, Outcome::Block);
    assert_eq!(decision.matched_rule.unwrap().kind(), RuleKind::ExactHost);

    let decision = guard.classify("https://www.googleapis.com/drive/v3/files?q=x");
    assert_eq!(decision.outcome, Outcome::Block);
    assert_eq!(decision.matched_rule.unwrap().kind(), RuleKind::Pattern);

    assert!(guard.classify("https://sheets.googleapis.com/v4/spreadsheets/ID/values/A1").is_allowed());
    assert!(guard.classify("not a url").is_allowed());
}

#[test]
fn test_fetch_reject_contract() {
    let h = Harness::new();
    guard(FetchBlockMode::Reject).install(&h.bindings);

    let result = h
        .runtime
        .block_on(h.bindings.fetch().fetch(FetchRequest::get("https://api.automa.site/ping")));
    assert!(matches!(result, Err(HttpError::Blocked(_))));
    assert_eq!(h.transport_calls(), 0);

    let response = h
        .runtime
        .block_on(h.bindings.fetch().fetch(FetchRequest::get(
            "https://sheets.googleapis.com/v4/spreadsheets/ID/values/A1",
        )))
        .unwrap();
    assert_eq!(response.body, b"origin");
    assert_eq!(h.transport_calls(), 1);
}

#[test]
fn test_fetch_resolve_contract() {
    let h = Harness::new();
    guard(FetchBlockMode::Resolve).install(&h.bindings);

    let response = h
        .runtime
        .block_on(h.bindings.fetch().fetch(FetchRequest::get(
            "https://www.googleapis.com/drive/v3/files?q=x",
        )))
        .unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["error"], "blocked");
    assert_eq!(h.transport_calls(), 0);
}

#[test]
fn test_request_object_error_event() {
    let h = Harness::new();
    guard(FetchBlockMode::Reject).install(&h.bindings);

    let mut request = h.bindings.http_request().create();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in [RequestEventKind::Error, RequestEventKind::Load, RequestEventKind::LoadEnd] {
        let seen = seen.clone();
        request
            .events()
            .add_listener(kind, move |e: &RequestEvent| seen.lock().unwrap().push((e.kind, e.snapshot.status)));
    }

    request.open(Method::POST, "https://api.automa.site/workflows");
    request.send(Some(Bytes::from_static(b"{}")));
    assert!(seen.lock().unwrap().is_empty());

    assert!(h.queue.run_next_timeout(Duration::from_secs(5)));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(RequestEventKind::Error, 403), (RequestEventKind::LoadEnd, 403)]
    );
    assert_eq!(request.snapshot().ready_state, ReadyState::Done);
    assert_eq!(h.transport_calls(), 0);

    // Cancelling a blocked request does nothing
    request.abort();
    assert_eq!(request.snapshot().status, 403);
    assert_eq!(h.queue.pending(), 0);
}

#[test]
fn test_request_object_allowed() {
    let h = Harness::new();
    guard(FetchBlockMode::Reject).install(&h.bindings);

    let mut request = h.bindings.http_request().create();
    request.open(Method::GET, "https://sheets.googleapis.com/v4/spreadsheets/ID");
    request.send(None);

    assert!(h.queue.run_next_timeout(Duration::from_secs(5)));
    let snapshot = request.snapshot();
    assert_eq!(snapshot.status, 200);
    assert_eq!(snapshot.response_text, "origin");
    assert_eq!(h.transport_calls(), 1);
}

#[test]
fn test_socket_contract() {
    let h = Harness::new();
    guard(FetchBlockMode::Reject).install(&h.bindings);

    let blocked = h.bindings.socket().connect("wss://api.automa.site/live");
    assert!(matches!(blocked, Err(SocketError::Blocked(_))));
    assert_eq!(h.connector.calls.load(Ordering::SeqCst), 0);

    let socket = h.bindings.socket().connect("tcp://example.com:7000").unwrap();
    assert!(Arc::ptr_eq(&socket, &h.connector.socket));
}

#[test]
fn test_beacon_and_loader() {
    let h = Harness::new();
    guard(FetchBlockMode::Reject).install(&h.bindings);

    assert!(!h.bindings.beacon().send_beacon("https://api.automa.site/collect", None));

    let img = Element::new("img");
    h.bindings
        .loader()
        .set_attribute(&img, "src", "https://api.automa.site/pixel.gif");
    assert_eq!(img.attribute("src"), None);
    assert_eq!(h.queue.pending(), 0);
    assert_eq!(h.transport_calls(), 0);
}

#[test]
fn test_install_twice_single_layer() {
    let h = Harness::new();
    let pristine = h.bindings.fetch();
    let guard = guard(FetchBlockMode::Reject);

    let first = guard.install(&h.bindings);
    assert_eq!(first.changed.len(), 5);
    let wrapped = h.bindings.fetch();

    let second = guard.install(&h.bindings);
    assert!(second.is_noop());
    assert!(Arc::ptr_eq(&h.bindings.fetch(), &wrapped));
    assert!(Arc::ptr_eq(&h.bindings.fetch_slot().original().unwrap(), &pristine));

    // A blocked call is counted exactly once
    let _ = h
        .runtime
        .block_on(h.bindings.fetch().fetch(FetchRequest::get("https://api.automa.site/ping")));
    assert_eq!(guard.stats().get(Primitive::Fetch).blocked, 1);
}

#[test]
fn test_uninstall_restores_originals() {
    let h = Harness::new();
    let pristine = h.bindings.socket();
    guard(FetchBlockMode::Reject).install(&h.bindings);

    let report = NetworkGuard::uninstall(&h.bindings);
    assert_eq!(report.changed.len(), 5);
    assert!(Arc::ptr_eq(&h.bindings.socket(), &pristine));
    assert!(Primitive::ALL.iter().all(|p| !h.bindings.is_replaced(*p)));
    assert!(NetworkGuard::uninstall(&h.bindings).is_noop());

    assert!(h.bindings.socket().connect("wss://api.automa.site/live").is_ok());
}

#[test]
fn test_activation_gate() {
    let h = Harness::new();
    let config = GuardConfig {
        policy: scenario_policy(),
        ..GuardConfig::default()
    };

    let popup = Url::parse("chrome-extension://syar/popup.html").unwrap();
    assert!(activate(&config, &popup, &h.bindings).unwrap().is_none());
    assert!(!h.bindings.is_replaced(Primitive::Fetch));

    let newtab = Url::parse("chrome-extension://syar/newtab.html").unwrap();
    let guard = activate(&config, &newtab, &h.bindings).unwrap().unwrap();
    assert!(h.bindings.is_replaced(Primitive::Fetch));
    assert_eq!(guard.classifier().base(), Some(&newtab));

    let always = GuardConfig {
        activation: Activation::always(),
        ..config
    };
    assert!(activate(&always, &popup, &h.bindings).unwrap().is_some());
}
