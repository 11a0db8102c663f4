//! Request object adapter
//!
//! `open` records the target and its classification on the object and is
//! always forwarded. `send` reaches the real object only for allowed
//! targets; a blocked send answers with a synthetic 403 on a later queue
//! turn, raising `error` like a failed real request would.

use super::{blocked_body, GuardContext, BLOCKED_STATUS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use syar_network::{
    dispatch_final_events, Bytes, EventTarget, HeaderName, HeaderValue, HttpRequestFactory, HttpRequestObject, Method,
    Primitive, ReadyState, RequestEvent, RequestEventKind, RequestSnapshot, TaskQueue,
};
use syar_policy::Decision;
use tracing::debug;

/// Per-object record made by `open`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionState {
    pub target: String,
    pub decision: Decision,
    /// Set once `send` has run for this open
    pub sent: bool,
}

impl InterceptionState {
    pub fn is_blocked(&self) -> bool {
        self.decision.is_blocked()
    }
}

/// Request object wrapping a real one
pub struct GuardedRequest {
    inner: Box<dyn HttpRequestObject>,
    ctx: GuardContext,
    queue: TaskQueue,
    interception: Option<InterceptionState>,
    /// Final state of a blocked send, once delivered
    synthetic: Arc<Mutex<Option<RequestSnapshot>>>,
    /// Set by a re-open, checked by the posted blocked outcome
    cancelled: Arc<AtomicBool>,
}

impl GuardedRequest {
    pub fn new(inner: Box<dyn HttpRequestObject>, ctx: GuardContext, queue: TaskQueue) -> Self {
        Self {
            inner,
            ctx,
            queue,
            interception: None,
            synthetic: Arc::new(Mutex::new(None)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn interception(&self) -> Option<&InterceptionState> {
        self.interception.as_ref()
    }

    fn is_blocked(&self) -> bool {
        self.interception.as_ref().is_some_and(InterceptionState::is_blocked)
    }
}

impl HttpRequestObject for GuardedRequest {
    fn open(&mut self, method: Method, url: &str) {
        let decision = self.ctx.check(Primitive::HttpRequest, url);
        self.interception = Some(InterceptionState {
            target: url.to_string(),
            decision,
            sent: false,
        });
        self.cancelled.store(true, Ordering::Release);
        self.cancelled = Arc::new(AtomicBool::new(false));
        self.synthetic = Arc::new(Mutex::new(None));
        self.inner.open(method, url);
    }

    fn set_request_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.set_request_header(name, value);
    }

    fn send(&mut self, body: Option<Bytes>) {
        let Some(state) = self.interception.as_mut().filter(|s| s.is_blocked()) else {
            self.inner.send(body);
            return;
        };
        if state.sent {
            debug!("send already called for {}", state.target);
            return;
        }
        state.sent = true;

        debug!("Answering blocked request to {} locally", state.target);
        let snapshot = RequestSnapshot {
            ready_state: ReadyState::Done,
            status: BLOCKED_STATUS.as_u16(),
            status_text: BLOCKED_STATUS.canonical_reason().unwrap_or_default().to_string(),
            response_text: String::from_utf8_lossy(&blocked_body(&state.target, &state.decision)).into_owned(),
            response_url: state.target.clone(),
        };
        let synthetic = Arc::clone(&self.synthetic);
        let events = self.inner.events().clone();
        let cancelled = Arc::clone(&self.cancelled);

        self.queue.post(move || {
            if cancelled.load(Ordering::Acquire) {
                return;
            }
            *synthetic.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
            dispatch_final_events(&events, &snapshot, RequestEventKind::Error);
        });
    }

    fn abort(&mut self) {
        // Nothing was started for a blocked target
        if self.is_blocked() {
            return;
        }
        self.inner.abort();
    }

    fn snapshot(&self) -> RequestSnapshot {
        match self.synthetic.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(snapshot) => snapshot.clone(),
            None => self.inner.snapshot(),
        }
    }

    fn events(&self) -> &EventTarget<RequestEvent> {
        self.inner.events()
    }
}

/// Factory handing out [`GuardedRequest`]s around the original factory's objects
pub struct GuardedRequestFactory {
    inner: Arc<dyn HttpRequestFactory>,
    ctx: GuardContext,
    queue: TaskQueue,
}

impl GuardedRequestFactory {
    pub fn new(inner: Arc<dyn HttpRequestFactory>, ctx: GuardContext, queue: TaskQueue) -> Self {
        Self { inner, ctx, queue }
    }
}

impl HttpRequestFactory for GuardedRequestFactory {
    fn create(&self) -> Box<dyn HttpRequestObject> {
        Box::new(GuardedRequest::new(
            self.inner.create(),
            self.ctx.clone(),
            self.queue.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::context;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Request object that records calls and never touches the network
    #[derive(Default)]
    struct Recording {
        opens: Arc<AtomicUsize>,
        sends: Arc<AtomicUsize>,
        aborts: Arc<AtomicUsize>,
        events: EventTarget<RequestEvent>,
    }

    impl HttpRequestObject for Recording {
        fn open(&mut self, _method: Method, _url: &str) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }

        fn set_request_header(&mut self, _name: HeaderName, _value: HeaderValue) {}

        fn send(&mut self, _body: Option<Bytes>) {
            self.sends.fetch_add(1, Ordering::SeqCst);
        }

        fn abort(&mut self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }

        fn snapshot(&self) -> RequestSnapshot {
            RequestSnapshot {
                ready_state: ReadyState::Opened,
                ..RequestSnapshot::default()
            }
        }

        fn events(&self) -> &EventTarget<RequestEvent> {
            &self.events
        }
    }

    fn guarded() -> (GuardedRequest, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>, TaskQueue) {
        let inner = Recording::default();
        let (opens, sends, aborts) = (inner.opens.clone(), inner.sends.clone(), inner.aborts.clone());
        let queue = TaskQueue::new();
        let request = GuardedRequest::new(Box::new(inner), context(), queue.clone());
        (request, opens, sends, aborts, queue)
    }

    #[test]
    fn test_blocked_send_raises_deferred_error() {
        let (mut request, opens, sends, _aborts, queue) = guarded();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        for kind in [RequestEventKind::ReadyStateChange, RequestEventKind::Error, RequestEventKind::LoadEnd] {
            let kinds = kinds.clone();
            request
                .events()
                .add_listener(kind, move |e: &RequestEvent| kinds.lock().unwrap().push(e.kind));
        }

        request.open(Method::GET, "https://api.automa.site/workflows");
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(request.interception().unwrap().is_blocked());

        request.send(None);
        assert_eq!(sends.load(Ordering::SeqCst), 0);
        // Deferred: nothing raised until the queue turns
        assert!(kinds.lock().unwrap().is_empty());
        assert_eq!(request.snapshot().ready_state, ReadyState::Opened);

        assert_eq!(queue.run_until_idle(), 1);
        use RequestEventKind::*;
        assert_eq!(*kinds.lock().unwrap(), vec![ReadyStateChange, Error, LoadEnd]);

        let snapshot = request.snapshot();
        assert_eq!(snapshot.ready_state, ReadyState::Done);
        assert_eq!(snapshot.status, 403);
        assert_eq!(snapshot.status_text, "Forbidden");
        assert!(snapshot.response_text.contains("external service disabled"));
    }

    #[test]
    fn test_allowed_send_forwards() {
        let (mut request, _opens, sends, aborts, queue) = guarded();
        request.open(Method::POST, "https://sheets.googleapis.com/v4/spreadsheets/x");
        request.send(Some(Bytes::from_static(b"{}")));
        request.abort();

        assert_eq!(sends.load(Ordering::SeqCst), 1);
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_abort_on_blocked_is_noop() {
        let (mut request, _opens, _sends, aborts, queue) = guarded();
        request.open(Method::GET, "https://api.automa.site/x");
        request.send(None);
        request.abort();
        assert_eq!(aborts.load(Ordering::SeqCst), 0);
        queue.run_until_idle();
        assert_eq!(request.snapshot().status, 403);
    }

    fn record_final(request: &GuardedRequest) -> Arc<Mutex<Vec<(RequestEventKind, u16)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [RequestEventKind::Error, RequestEventKind::LoadEnd] {
            let seen = seen.clone();
            request
                .events()
                .add_listener(kind, move |e: &RequestEvent| seen.lock().unwrap().push((e.kind, e.snapshot.status)));
        }
        seen
    }

    #[test]
    fn test_second_blocked_send_is_ignored() {
        let (mut request, _opens, _sends, _aborts, queue) = guarded();
        let seen = record_final(&request);

        request.open(Method::GET, "https://api.automa.site/x");
        request.send(None);
        request.send(None);
        assert!(request.interception().unwrap().sent);

        assert_eq!(queue.run_until_idle(), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(RequestEventKind::Error, 403), (RequestEventKind::LoadEnd, 403)]
        );
    }

    #[test]
    fn test_reopen_cancels_blocked_outcome() {
        let (mut request, _opens, sends, _aborts, queue) = guarded();
        let seen = record_final(&request);

        request.open(Method::GET, "https://api.automa.site/x");
        request.send(None);
        request.open(Method::GET, "https://example.com/");
        assert!(!request.interception().unwrap().sent);

        queue.run_until_idle();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(request.snapshot().ready_state, ReadyState::Opened);
        assert_eq!(request.snapshot().status, 0);

        request.send(None);
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reopen_reclassifies() {
        let (mut request, _opens, sends, _aborts, _queue) = guarded();
        request.open(Method::GET, "https://api.automa.site/x");
        request.open(Method::GET, "https://example.com/");
        assert!(!request.interception().unwrap().is_blocked());
        request.send(None);
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }
}
