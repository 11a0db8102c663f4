//! Socket adapter

use super::{blocked_reason, GuardContext};
use std::sync::Arc;
use syar_network::{Primitive, SocketConnector, SocketError, StreamSocket};

/// Connector that raises before any connection attempt to a blocked target
pub struct GuardedSocketConnector {
    inner: Arc<dyn SocketConnector>,
    ctx: GuardContext,
}

impl GuardedSocketConnector {
    pub fn new(inner: Arc<dyn SocketConnector>, ctx: GuardContext) -> Self {
        Self { inner, ctx }
    }
}

impl SocketConnector for GuardedSocketConnector {
    fn connect(&self, url: &str) -> Result<Arc<dyn StreamSocket>, SocketError> {
        let decision = self.ctx.check(Primitive::Socket, url);
        if decision.is_blocked() {
            return Err(SocketError::Blocked(blocked_reason(&decision)));
        }
        self.inner.connect(url)
    }
}
