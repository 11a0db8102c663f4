//! Interception statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use syar_network::Primitive;

#[derive(Debug, Default)]
struct Counters {
    checked: AtomicU64,
    blocked: AtomicU64,
}

/// Per-primitive counters of checked and blocked calls
#[derive(Debug, Default)]
pub struct GuardStats {
    counters: [Counters; 5],
}

/// Counters for one primitive at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveStats {
    pub primitive: Primitive,
    pub checked: u64,
    pub blocked: u64,
}

fn index(primitive: Primitive) -> usize {
    match primitive {
        Primitive::Fetch => 0,
        Primitive::HttpRequest => 1,
        Primitive::Socket => 2,
        Primitive::Beacon => 3,
        Primitive::ResourceLoader => 4,
    }
}

impl GuardStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, primitive: Primitive, blocked: bool) {
        let counters = &self.counters[index(primitive)];
        counters.checked.fetch_add(1, Ordering::Relaxed);
        if blocked {
            counters.blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, primitive: Primitive) -> PrimitiveStats {
        let counters = &self.counters[index(primitive)];
        PrimitiveStats {
            primitive,
            checked: counters.checked.load(Ordering::Relaxed),
            blocked: counters.blocked.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> Vec<PrimitiveStats> {
        Primitive::ALL.iter().map(|p| self.get(*p)).collect()
    }

    /// Total blocked calls across every primitive
    pub fn total_blocked(&self) -> u64 {
        self.snapshot().iter().map(|s| s.blocked).sum()
    }
}
