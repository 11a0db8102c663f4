//! Beacon adapter

use super::GuardContext;
use std::sync::Arc;
use syar_network::{Beacon, Bytes, Primitive};

/// Beacon that reports blocked targets as "not queued"
pub struct GuardedBeacon {
    inner: Arc<dyn Beacon>,
    ctx: GuardContext,
}

impl GuardedBeacon {
    pub fn new(inner: Arc<dyn Beacon>, ctx: GuardContext) -> Self {
        Self { inner, ctx }
    }
}

impl Beacon for GuardedBeacon {
    fn send_beacon(&self, url: &str, data: Option<Bytes>) -> bool {
        if self.ctx.check(Primitive::Beacon, url).is_blocked() {
            return false;
        }
        self.inner.send_beacon(url, data)
    }
}
