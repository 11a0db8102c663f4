//! Read-only introspection of an installed guard

use crate::stats::{GuardStats, PrimitiveStats};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use syar_policy::{Classifier, Decision, Policy, RuleSummary};
use tracing::debug;

static PUBLISHED: OnceLock<Diagnostics> = OnceLock::new();

/// View of the active rules and counters. Offers no way to change either.
#[derive(Clone)]
pub struct Diagnostics {
    classifier: Arc<Classifier>,
    stats: Arc<GuardStats>,
}

#[derive(Serialize)]
struct Report<'a> {
    base: Option<&'a str>,
    rules: Vec<RuleSummary>,
    stats: Vec<PrimitiveStats>,
}

impl Diagnostics {
    pub(crate) fn new(classifier: Arc<Classifier>, stats: Arc<GuardStats>) -> Self {
        Self { classifier, stats }
    }

    /// Diagnostics of the process-wide guard, once installed
    pub fn global() -> Option<&'static Diagnostics> {
        PUBLISHED.get()
    }

    pub(crate) fn publish(self) {
        if PUBLISHED.set(self).is_err() {
            debug!("Diagnostics already published");
        }
    }

    pub fn policy(&self) -> &Policy {
        self.classifier.policy()
    }

    /// Every rule, allow entries first
    pub fn rules(&self) -> Vec<RuleSummary> {
        self.classifier.policy().summaries()
    }

    /// Classify as the adapters would, without counting the call
    pub fn classify(&self, url: &str) -> Decision {
        self.classifier.classify(url)
    }

    pub fn stats(&self) -> Vec<PrimitiveStats> {
        self.stats.snapshot()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Report {
            base: self.classifier.base().map(|b| b.as_str()),
            rules: self.rules(),
            stats: self.stats(),
        })
    }
}
