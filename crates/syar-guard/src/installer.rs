//! Guard installation
//!
//! Replaces each primitive binding with its adapter. Every slot is replaced
//! at most once, so running the installer again never stacks a second
//! layer and the adapters always call through to the pristine originals.

use crate::adapters::{
    FetchBlockMode, GuardContext, GuardedBeacon, GuardedFetch, GuardedLoader, GuardedRequestFactory,
    GuardedSocketConnector,
};
use crate::config::{GuardConfig, GuardError};
use crate::diagnostics::Diagnostics;
use crate::stats::GuardStats;
use serde::Serialize;
use std::sync::Arc;
use syar_network::{Bindings, Primitive};
use syar_policy::{Classifier, Decision, Policy};
use tracing::{debug, info, warn};
use url::Url;

/// What one `install` or `uninstall` call changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Primitives whose binding was replaced (or restored) by this call
    pub changed: Vec<Primitive>,
    /// Primitives left as they were
    pub unchanged: Vec<Primitive>,
}

impl InstallReport {
    fn record(&mut self, primitive: Primitive, changed: bool) {
        if changed {
            self.changed.push(primitive);
        } else {
            self.unchanged.push(primitive);
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// The interception engine: one classifier shared by every adapter
#[derive(Clone)]
pub struct NetworkGuard {
    classifier: Arc<Classifier>,
    stats: Arc<GuardStats>,
    fetch_mode: FetchBlockMode,
}

impl NetworkGuard {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier: Arc::new(classifier),
            stats: Arc::new(GuardStats::new()),
            fetch_mode: FetchBlockMode::default(),
        }
    }

    /// Guard over `policy` with no base URL
    pub fn with_policy(policy: Policy) -> Self {
        Self::new(Classifier::new(Arc::new(policy)))
    }

    /// Build from configuration. `location` takes precedence over the
    /// configured `base_url` for resolving relative targets.
    pub fn from_config(config: &GuardConfig, location: Option<&Url>) -> Result<Self, GuardError> {
        let policy = Arc::new(config.policy.build()?);
        let base = match location {
            Some(location) => Some(location.clone()),
            None => config.base()?,
        };
        let classifier = match base {
            Some(base) => Classifier::with_base(policy, base),
            None => Classifier::new(policy),
        };
        Ok(Self::new(classifier).with_fetch_mode(config.fetch_block_mode))
    }

    pub fn with_fetch_mode(mut self, mode: FetchBlockMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    pub fn fetch_mode(&self) -> FetchBlockMode {
        self.fetch_mode
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn stats(&self) -> &GuardStats {
        &self.stats
    }

    /// Classify without counting or installing anything
    pub fn classify(&self, url: &str) -> Decision {
        self.classifier.classify(url)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::new(Arc::clone(&self.classifier), Arc::clone(&self.stats))
    }

    fn context(&self) -> GuardContext {
        GuardContext::new(Arc::clone(&self.classifier), Arc::clone(&self.stats))
    }

    /// Wrap every primitive in `bindings` that is not wrapped yet
    pub fn install(&self, bindings: &Bindings) -> InstallReport {
        let ctx = self.context();
        let mode = self.fetch_mode;
        let queue = bindings.task_queue().clone();
        let mut report = InstallReport::default();

        report.record(
            Primitive::Fetch,
            bindings
                .fetch_slot()
                .replace_once(|inner| Arc::new(GuardedFetch::new(inner, ctx.clone(), mode))),
        );
        report.record(
            Primitive::HttpRequest,
            bindings
                .http_request_slot()
                .replace_once(|inner| Arc::new(GuardedRequestFactory::new(inner, ctx.clone(), queue))),
        );
        report.record(
            Primitive::Socket,
            bindings
                .socket_slot()
                .replace_once(|inner| Arc::new(GuardedSocketConnector::new(inner, ctx.clone()))),
        );
        report.record(
            Primitive::Beacon,
            bindings
                .beacon_slot()
                .replace_once(|inner| Arc::new(GuardedBeacon::new(inner, ctx.clone()))),
        );
        report.record(
            Primitive::ResourceLoader,
            bindings
                .loader_slot()
                .replace_once(|inner| Arc::new(GuardedLoader::new(inner, ctx))),
        );

        if report.is_noop() {
            debug!("Network guard already installed");
        } else {
            info!(
                "Network guard installed: {} primitives, {} rules, fetch mode {:?}",
                report.changed.len(),
                self.classifier.policy().rule_count(),
                self.fetch_mode
            );
        }
        report
    }

    /// Put the original primitives back
    pub fn uninstall(bindings: &Bindings) -> InstallReport {
        let mut report = InstallReport::default();
        report.record(Primitive::Fetch, bindings.fetch_slot().restore());
        report.record(Primitive::HttpRequest, bindings.http_request_slot().restore());
        report.record(Primitive::Socket, bindings.socket_slot().restore());
        report.record(Primitive::Beacon, bindings.beacon_slot().restore());
        report.record(Primitive::ResourceLoader, bindings.loader_slot().restore());

        if !report.is_noop() {
            info!("Network guard removed from {} primitives", report.changed.len());
        }
        report
    }

    /// Install into the process-wide bindings and publish diagnostics
    pub fn install_process_wide(&self) -> Option<InstallReport> {
        let Some(bindings) = Bindings::global() else {
            warn!("No process-wide bindings; network guard not installed");
            return None;
        };
        let report = self.install(bindings);
        if !report.is_noop() {
            self.diagnostics().publish();
        }
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_prefers_location() {
        let config = GuardConfig {
            base_url: Some("https://configured.test/".into()),
            ..GuardConfig::default()
        };
        let location = Url::parse("chrome-extension://syar/newtab.html").unwrap();

        let guard = NetworkGuard::from_config(&config, Some(&location)).unwrap();
        assert_eq!(guard.classifier().base(), Some(&location));

        let guard = NetworkGuard::from_config(&config, None).unwrap();
        assert_eq!(guard.classifier().base().unwrap().host_str(), Some("configured.test"));
    }

    #[test]
    fn test_classify_does_not_count() {
        let guard = NetworkGuard::from_config(&GuardConfig::default(), None).unwrap();
        assert!(guard.classify("https://api.automa.site/").is_blocked());
        assert_eq!(guard.stats().total_blocked(), 0);
    }

    #[test]
    fn test_bad_pattern_fails_whole() {
        let mut config = GuardConfig::default();
        config.policy.block_patterns.push(syar_policy::PatternConfig::Plain("(".into()));
        assert!(matches!(
            NetworkGuard::from_config(&config, None),
            Err(GuardError::Policy(_))
        ));
    }
}
