//! Resource loader adapter
//!
//! A blocked write is dropped whole: the attribute is not stored and no
//! load begins. `srcset` is blocked if any of its candidates is.

use super::GuardContext;
use std::sync::Arc;
use syar_network::{is_load_attribute, load_targets, Element, Primitive, ResourceLoader};
use tracing::trace;

pub struct GuardedLoader {
    inner: Arc<dyn ResourceLoader>,
    ctx: GuardContext,
}

impl GuardedLoader {
    pub fn new(inner: Arc<dyn ResourceLoader>, ctx: GuardContext) -> Self {
        Self { inner, ctx }
    }
}

impl ResourceLoader for GuardedLoader {
    fn set_attribute(&self, element: &Element, name: &str, value: &str) {
        if is_load_attribute(name) {
            let blocked = load_targets(name, value)
                .into_iter()
                .any(|target| self.ctx.check(Primitive::ResourceLoader, target).is_blocked());
            if blocked {
                trace!("Discarded {}= write on <{}>", name, element.tag());
                return;
            }
        }
        self.inner.set_attribute(element, name, value);
    }
}
