//! Passive resource loads
//!
//! Writing a load-target attribute (`src`, `href`, ...) on an element
//! starts a load. There is no error channel back to the writer; the
//! element raises `load` or `error` later.

use crate::client::FetchRequest;
use crate::event_loop::TaskQueue;
use crate::events::{Event, EventTarget};
use crate::fetch::Fetch;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tracing::trace;

/// Attributes whose write starts a load
pub const LOAD_ATTRIBUTES: &[&str] = &["src", "href", "srcset", "data", "poster"];

/// Check whether writing `attribute` starts a load
pub fn is_load_attribute(attribute: &str) -> bool {
    LOAD_ATTRIBUTES.iter().any(|a| a.eq_ignore_ascii_case(attribute))
}

/// URLs a load attribute refers to. `srcset` lists several candidates,
/// each optionally followed by a descriptor (`a.png 1x, b.png 2x`).
pub fn load_targets<'a>(attribute: &str, value: &'a str) -> Vec<&'a str> {
    if attribute.eq_ignore_ascii_case("srcset") {
        return value
            .split(',')
            .filter_map(|candidate| candidate.split_whitespace().next())
            .collect();
    }

    let value = value.trim();
    if value.is_empty() { Vec::new() } else { vec![value] }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadEventKind {
    Load,
    Error,
}

#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub kind: LoadEventKind,
    pub url: String,
}

impl Event for LoadEvent {
    type Kind = LoadEventKind;

    fn kind(&self) -> LoadEventKind {
        self.kind
    }
}

/// An element that can carry load-target attributes
#[derive(Debug)]
pub struct Element {
    tag: String,
    attributes: Mutex<HashMap<String, String>>,
    events: EventTarget<LoadEvent>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Mutex::new(HashMap::new()),
            events: EventTarget::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Store an attribute without side effects
    pub fn store_attribute(&self, name: &str, value: &str) {
        self.attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn events(&self) -> &EventTarget<LoadEvent> {
        &self.events
    }
}

/// The attribute-write primitive
pub trait ResourceLoader: Send + Sync {
    /// Write an attribute on `element`, starting a load if it is a load target
    fn set_attribute(&self, element: &Element, name: &str, value: &str);
}

/// Loader that issues a GET through a fetch primitive for the first target
pub struct FetchLoader {
    fetch: Arc<dyn Fetch>,
    runtime: Handle,
    queue: TaskQueue,
}

impl FetchLoader {
    pub fn new(fetch: Arc<dyn Fetch>, runtime: Handle, queue: TaskQueue) -> Self {
        Self { fetch, runtime, queue }
    }
}

impl ResourceLoader for FetchLoader {
    fn set_attribute(&self, element: &Element, name: &str, value: &str) {
        element.store_attribute(name, value);
        if !is_load_attribute(name) {
            return;
        }

        let Some(target) = load_targets(name, value).first().map(|t| t.to_string()) else {
            return;
        };

        trace!("Loading {:?} for <{}>", target, element.tag());
        let future = self.fetch.fetch(FetchRequest::get(target.clone()));
        let queue = self.queue.clone();
        let events = element.events().clone();

        self.runtime.spawn(async move {
            let kind = match future.await {
                Ok(response) if response.is_success() => LoadEventKind::Load,
                _ => LoadEventKind::Error,
            };
            queue.post(move || {
                events.dispatch(&LoadEvent { kind, url: target });
            });
        });
    }
}
