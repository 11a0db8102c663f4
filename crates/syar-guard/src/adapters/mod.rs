//! Primitive adapters
//!
//! One adapter per primitive. Each classifies the target before anything
//! reaches the original primitive and, when blocked, fails through that
//! primitive's own failure channel:
//!
//! | Primitive      | Blocked outcome                                         |
//! |----------------|---------------------------------------------------------|
//! | fetch          | rejected future or synthetic 403 response (configurable)|
//! | request object | synthetic 403 state + deferred `error` event            |
//! | socket         | synchronous `SocketError::Blocked`                      |
//! | beacon         | `false`                                                 |
//! | loader         | attribute write discarded                               |

mod beacon;
mod fetch;
mod loader;
mod request;
mod socket;

pub use beacon::GuardedBeacon;
pub use fetch::{FetchBlockMode, GuardedFetch};
pub use loader::GuardedLoader;
pub use request::{GuardedRequest, GuardedRequestFactory, InterceptionState};
pub use socket::GuardedSocketConnector;

use crate::stats::GuardStats;
use serde::Serialize;
use std::sync::Arc;
use syar_network::{Primitive, StatusCode};
use syar_policy::{Classifier, Decision, RuleSummary, UrlLike};
use tracing::{info, trace};

/// Log target carrying one record per blocked call
pub const AUDIT_TARGET: &str = "syar_guard::audit";

/// Message carried by every synthetic failure
pub const BLOCKED_MESSAGE: &str = "Blocked by Syar Automation: external service disabled";

/// Status of synthetic responses
pub const BLOCKED_STATUS: StatusCode = StatusCode::FORBIDDEN;

/// What every adapter shares: the classifier and the counters
#[derive(Clone)]
pub struct GuardContext {
    classifier: Arc<Classifier>,
    stats: Arc<GuardStats>,
}

impl GuardContext {
    pub fn new(classifier: Arc<Classifier>, stats: Arc<GuardStats>) -> Self {
        Self { classifier, stats }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn stats(&self) -> &GuardStats {
        &self.stats
    }

    /// Classify a call's target, count it and audit blocks
    pub fn check<T: UrlLike + ?Sized>(&self, primitive: Primitive, target: &T) -> Decision {
        let decision = self.classifier.classify(target);
        self.stats.record(primitive, decision.is_blocked());

        if let Some(rule) = &decision.matched_rule {
            let url = target.url_like().unwrap_or_default();
            info!(target: AUDIT_TARGET, primitive = %primitive, url = %url, rule = %rule, "Blocked");
        } else {
            trace!("{} allowed", primitive);
        }
        decision
    }
}

#[derive(Serialize)]
struct BlockedBody<'a> {
    error: &'static str,
    message: &'static str,
    url: &'a str,
    rule: Option<RuleSummary>,
}

/// JSON body of synthetic failure responses
pub(crate) fn blocked_body(url: &str, decision: &Decision) -> Vec<u8> {
    let body = BlockedBody {
        error: "blocked",
        message: BLOCKED_MESSAGE,
        url,
        rule: decision.matched_rule.as_ref().map(|r| r.summary()),
    };
    serde_json::to_vec(&body).unwrap_or_default()
}

/// Error text for rejected calls
pub(crate) fn blocked_reason(decision: &Decision) -> String {
    match &decision.matched_rule {
        Some(rule) => format!("{} ({})", BLOCKED_MESSAGE, rule),
        None => BLOCKED_MESSAGE.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use syar_policy::Rule;

    #[test]
    fn test_check_counts_and_classifies() {
        let ctx = testing::context();
        assert!(ctx.check(Primitive::Fetch, "https://api.automa.site/ping").is_blocked());
        assert!(ctx.check(Primitive::Fetch, "not a url").is_allowed());
        assert_eq!(ctx.stats().get(Primitive::Fetch).checked, 2);
        assert_eq!(ctx.stats().get(Primitive::Fetch).blocked, 1);
    }

    #[test]
    fn test_blocked_body_is_json() {
        let decision = Decision::block(Rule::ExactHost("api.automa.site".into()));
        let body: serde_json::Value =
            serde_json::from_slice(&blocked_body("https://api.automa.site/ping", &decision)).unwrap();
        assert_eq!(body["error"], "blocked");
        assert_eq!(body["rule"]["kind"], "exact_host");
        assert_eq!(body["rule"]["value"], "api.automa.site");
        assert!(blocked_reason(&decision).contains("host: api.automa.site"));
    }
}
