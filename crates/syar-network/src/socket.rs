//! Streaming socket primitive
//!
//! Constructing a socket validates the target synchronously and returns a
//! handle immediately; the connection is established in the background and
//! reported through `open`, `message`, `error` and `close` events.
//!
//! Supported targets: `tcp://host:port` and `tls://host:port`. The stream
//! carries raw bytes; framing is up to the caller.

use crate::event_loop::TaskQueue;
use crate::events::{Event, EventTarget};
use hyper::body::Bytes;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use url::Url;

/// Socket errors
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Connection blocked: {0}")]
    Blocked(String),

    #[error("Invalid socket URL: {0}")]
    InvalidUrl(String),

    #[error("Socket is not open")]
    NotOpen,

    #[error("Socket is closed")]
    Closed,
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketEventKind {
    Open,
    Message,
    Error,
    Close,
}

#[derive(Debug, Clone)]
pub struct SocketEvent {
    pub kind: SocketEventKind,
    /// Payload of `message` events
    pub data: Option<Bytes>,
}

impl Event for SocketEvent {
    type Kind = SocketEventKind;

    fn kind(&self) -> SocketEventKind {
        self.kind
    }
}

/// A bidirectional stream handle
pub trait StreamSocket: Send + Sync {
    fn url(&self) -> &str;

    fn state(&self) -> SocketState;

    /// Queue bytes for sending. Fails unless the socket is open.
    fn send(&self, data: Bytes) -> Result<(), SocketError>;

    fn close(&self);

    fn events(&self) -> &EventTarget<SocketEvent>;
}

/// The socket constructor primitive
pub trait SocketConnector: Send + Sync {
    /// Create a socket. Errors are raised synchronously, before any
    /// connection attempt.
    fn connect(&self, url: &str) -> Result<Arc<dyn StreamSocket>, SocketError>;
}

enum Outgoing {
    Data(Bytes),
    Close,
}

/// TCP (optionally TLS) stream
pub struct TcpSocket {
    url: String,
    state: Arc<Mutex<SocketState>>,
    outgoing: UnboundedSender<Outgoing>,
    events: EventTarget<SocketEvent>,
}

impl StreamSocket for TcpSocket {
    fn url(&self) -> &str {
        &self.url
    }

    fn state(&self) -> SocketState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, data: Bytes) -> Result<(), SocketError> {
        match self.state() {
            SocketState::Open => self.outgoing.send(Outgoing::Data(data)).map_err(|_| SocketError::Closed),
            SocketState::Connecting => Err(SocketError::NotOpen),
            SocketState::Closing | SocketState::Closed => Err(SocketError::Closed),
        }
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SocketState::Connecting | SocketState::Open) {
            *state = SocketState::Closing;
            let _ = self.outgoing.send(Outgoing::Close);
        }
    }

    fn events(&self) -> &EventTarget<SocketEvent> {
        &self.events
    }
}

/// Connector for `tcp://` and `tls://` targets
#[derive(Clone)]
pub struct TcpSocketConnector {
    runtime: Handle,
    queue: TaskQueue,
    tls: Arc<rustls::ClientConfig>,
}

impl TcpSocketConnector {
    pub fn new(runtime: Handle, queue: TaskQueue) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self {
            runtime,
            queue,
            tls: Arc::new(tls),
        }
    }

    fn parse_target(url: &str) -> Result<(String, u16, bool), SocketError> {
        let parsed = Url::parse(url).map_err(|e| SocketError::InvalidUrl(format!("{}: {}", url, e)))?;
        let use_tls = match parsed.scheme() {
            "tcp" => false,
            "tls" => true,
            other => return Err(SocketError::InvalidUrl(format!("unsupported scheme '{}'", other))),
        };
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SocketError::InvalidUrl(format!("{}: missing host", url)))?
            .to_string();
        let port = parsed
            .port()
            .ok_or_else(|| SocketError::InvalidUrl(format!("{}: missing port", url)))?;
        Ok((host, port, use_tls))
    }
}

impl SocketConnector for TcpSocketConnector {
    fn connect(&self, url: &str) -> Result<Arc<dyn StreamSocket>, SocketError> {
        let (host, port, use_tls) = Self::parse_target(url)?;

        let (tx, rx) = unbounded_channel();
        let socket = Arc::new(TcpSocket {
            url: url.to_string(),
            state: Arc::new(Mutex::new(SocketState::Connecting)),
            outgoing: tx,
            events: EventTarget::new(),
        });

        let link = Link {
            queue: self.queue.clone(),
            state: Arc::clone(&socket.state),
            events: socket.events.clone(),
        };
        let tls = Arc::clone(&self.tls);

        self.runtime.spawn(async move {
            let addr = format!("{}:{}", host, port);
            let stream = match tokio::net::TcpStream::connect(&addr).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("Socket connect to {} failed: {}", addr, e);
                    link.fail();
                    return;
                }
            };

            if !use_tls {
                link.run(stream, rx).await;
                return;
            }

            let server_name = match rustls::pki_types::ServerName::try_from(host) {
                Ok(name) => name,
                Err(_) => {
                    link.fail();
                    return;
                }
            };
            match TlsConnector::from(tls).connect(server_name, stream).await {
                Ok(tls_stream) => link.run(tls_stream, rx).await,
                Err(e) => {
                    debug!("TLS handshake with {} failed: {}", addr, e);
                    link.fail();
                }
            }
        });

        Ok(socket)
    }
}

/// Background side of a socket: posts state changes and events to the queue
struct Link {
    queue: TaskQueue,
    state: Arc<Mutex<SocketState>>,
    events: EventTarget<SocketEvent>,
}

impl Link {
    fn post(&self, next: Option<SocketState>, kind: SocketEventKind, data: Option<Bytes>) {
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        self.queue.post(move || {
            if let Some(next) = next {
                *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
            }
            events.dispatch(&SocketEvent { kind, data });
        });
    }

    fn fail(&self) {
        self.post(None, SocketEventKind::Error, None);
        self.post(Some(SocketState::Closed), SocketEventKind::Close, None);
    }

    async fn run<S>(self, mut stream: S, mut rx: UnboundedReceiver<Outgoing>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // close() may have been called while connecting
        let closing = *self.state.lock().unwrap_or_else(PoisonError::into_inner) == SocketState::Closing;
        if closing {
            let _ = stream.shutdown().await;
            self.post(Some(SocketState::Closed), SocketEventKind::Close, None);
            return;
        }
        self.post(Some(SocketState::Open), SocketEventKind::Open, None);

        let mut buf = vec![0u8; 16 * 1024];
        loop {
            tokio::select! {
                read = stream.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => self.post(None, SocketEventKind::Message, Some(Bytes::copy_from_slice(&buf[..n]))),
                    Err(e) => {
                        warn!("Socket read error: {}", e);
                        self.post(None, SocketEventKind::Error, None);
                        break;
                    }
                },
                outgoing = rx.recv() => match outgoing {
                    Some(Outgoing::Data(data)) => {
                        if let Err(e) = stream.write_all(&data).await {
                            warn!("Socket write error: {}", e);
                            self.post(None, SocketEventKind::Error, None);
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = stream.shutdown().await;
                        break;
                    }
                },
            }
        }

        self.post(Some(SocketState::Closed), SocketEventKind::Close, None);
    }
}
