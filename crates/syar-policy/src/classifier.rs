//! Classifier
//!
//! Maps a URL-like target to an allow/block [`Decision`]. Classification
//! is a pure function of the policy, the base URL and the input: it keeps
//! no state between calls and never fails.

use crate::policy::Policy;
use crate::rule::{PatternRule, Rule};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use url::Url;

/// Outcome of a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allow,
    Block,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::Block => write!(f, "BLOCK"),
        }
    }
}

/// Result of classifying one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    /// Rule responsible for a block, if any
    pub matched_rule: Option<Rule>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            outcome: Outcome::Allow,
            matched_rule: None,
        }
    }

    pub fn block(rule: Rule) -> Self {
        Self {
            outcome: Outcome::Block,
            matched_rule: Some(rule),
        }
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.outcome == Outcome::Block
    }

    #[inline]
    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matched_rule {
            Some(rule) => write!(f, "{} ({})", self.outcome, rule),
            None => write!(f, "{}", self.outcome),
        }
    }
}

/// Anything a network primitive accepts as its target.
///
/// Strings, parsed URLs and request objects that carry a URL all qualify.
/// Returning `None` means there is no usable target, which classifies
/// as allowed.
pub trait UrlLike {
    fn url_like(&self) -> Option<Cow<'_, str>>;
}

impl UrlLike for str {
    fn url_like(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self))
    }
}

impl UrlLike for String {
    fn url_like(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.as_str()))
    }
}

impl UrlLike for Url {
    fn url_like(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.as_str()))
    }
}

impl<T: UrlLike + ?Sized> UrlLike for &T {
    fn url_like(&self) -> Option<Cow<'_, str>> {
        (**self).url_like()
    }
}

impl<T: UrlLike> UrlLike for Option<T> {
    fn url_like(&self) -> Option<Cow<'_, str>> {
        self.as_ref().and_then(UrlLike::url_like)
    }
}

/// Pure policy evaluator
#[derive(Debug, Clone)]
pub struct Classifier {
    policy: Arc<Policy>,
    /// Implicit base for relative targets (the current document location)
    base: Option<Url>,
}

impl Classifier {
    /// Classifier without a base URL: relative targets are unparsable
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy, base: None }
    }

    /// Classifier resolving relative targets against `base`
    pub fn with_base(policy: Arc<Policy>, base: Url) -> Self {
        Self {
            policy,
            base: Some(base),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn shared_policy(&self) -> Arc<Policy> {
        Arc::clone(&self.policy)
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Resolve a raw target to an absolute URL.
    ///
    /// Blank input has no target and yields `None`, even with a base.
    pub fn normalize(&self, raw: &str) -> Option<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Url::options().base_url(self.base.as_ref()).parse(raw).ok()
    }

    /// Classify a target
    pub fn classify<T: UrlLike + ?Sized>(&self, input: &T) -> Decision {
        let Some(raw) = input.url_like() else {
            return Decision::allow();
        };

        let Some(url) = self.normalize(&raw) else {
            trace!("Unparsable target allowed: {:?}", raw);
            return Decision::allow();
        };

        self.classify_url(&url)
    }

    /// Classify an already normalized URL
    pub fn classify_url(&self, url: &Url) -> Decision {
        // Fully qualified form (`host.`) is the same host
        let host = url.host_str().unwrap_or_default().trim_end_matches('.').to_ascii_lowercase();
        let full = url.as_str();

        // 1. Allow-list overrides everything
        if self.policy.allowing_entry(&host).is_some() {
            return Decision::allow();
        }

        // 2. Blocked host (exact or parent)
        if let Some(blocked) = self.policy.blocking_host(&host) {
            return Decision::block(Rule::ExactHost(blocked.to_string()));
        }

        // 3. Patterns, first match wins
        if let Some(pattern) = self.policy.matching_pattern(&host, full) {
            return Decision::block(Rule::Pattern(PatternRule::clone(pattern)));
        }

        // 4. Keywords
        if let Some(keyword) = self.policy.matching_keyword(&full.to_lowercase()) {
            return Decision::block(Rule::Keyword(keyword.to_string()));
        }

        Decision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_policy() -> Arc<Policy> {
        Arc::new(
            Policy::builder()
                .allow("sheets.googleapis.com")
                .block_host("api.automa.site")
                .block_pattern("https://www.googleapis.com/drive/v3/files.*")
                .block_keyword("spreadsheets")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_end_to_end_scenario() {
        let classifier = Classifier::new(scenario_policy());

        let exact = classifier.classify("https://api.automa.site/ping");
        assert_eq!(exact.matched_rule, Some(Rule::ExactHost("api.automa.site".into())));

        let pattern = classifier.classify("https://www.googleapis.com/drive/v3/files?q=x");
        assert!(pattern.is_blocked());
        assert!(matches!(pattern.matched_rule, Some(Rule::Pattern(_))));

        // Would hit the "spreadsheets" keyword without the allow entry
        let allowed = classifier.classify("https://sheets.googleapis.com/v4/spreadsheets/ID/values/A1");
        assert_eq!(allowed, Decision::allow());

        assert_eq!(classifier.classify("not a url"), Decision::allow());
    }

    #[test]
    fn test_allow_beats_exact_block() {
        let policy = Policy::builder()
            .allow("automa.site")
            .block_host("automa.site")
            .block_keyword("automa")
            .build()
            .unwrap();
        let classifier = Classifier::new(Arc::new(policy));

        assert!(classifier.classify("https://automa.site/").is_allowed());
        assert!(classifier.classify("https://api.automa.site/").is_allowed());
    }

    #[test]
    fn test_suffix_semantics() {
        let policy = Policy::builder().block_host("automa.site").build().unwrap();
        let classifier = Classifier::new(Arc::new(policy));

        assert!(classifier.classify("https://api.automa.site/x").is_blocked());
        assert!(classifier.classify("https://AUTOMA.SITE").is_blocked());
        assert!(classifier.classify("https://notautoma.site/").is_allowed());
    }

    #[test]
    fn test_fully_qualified_host() {
        let classifier = Classifier::new(scenario_policy());

        let decision = classifier.classify("https://api.automa.site./ping");
        assert_eq!(decision.matched_rule, Some(Rule::ExactHost("api.automa.site".into())));
        assert!(classifier.classify("https://sheets.googleapis.com./v4/spreadsheets/ID").is_allowed());
    }

    #[test]
    fn test_fail_open() {
        let classifier = Classifier::new(scenario_policy());
        assert!(classifier.classify("").is_allowed());
        assert!(classifier.classify("   ").is_allowed());
        assert!(classifier.classify("/drive/v3/files").is_allowed());
        assert!(classifier.classify("http://[::1").is_allowed());
        assert!(classifier.classify(&None::<String>).is_allowed());
    }

    #[test]
    fn test_relative_target_uses_base() {
        let base = Url::parse("https://api.automa.site/newtab.html").unwrap();
        let classifier = Classifier::with_base(scenario_policy(), base);

        let decision = classifier.classify("/v1/track");
        assert!(decision.is_blocked());

        // Blank stays blank even with a base
        assert!(classifier.classify("").is_allowed());
    }

    #[test]
    fn test_keyword_matches_lowercased_url() {
        let policy = Policy::builder().block_keyword("backup").build().unwrap();
        let classifier = Classifier::new(Arc::new(policy));
        let decision = classifier.classify("https://example.com/Workflows/BACKUP");
        assert_eq!(decision.matched_rule, Some(Rule::Keyword("backup".into())));
    }

    #[test]
    fn test_pattern_precedes_keyword() {
        let policy = Policy::builder()
            .block_pattern("/upload/")
            .block_keyword("upload")
            .build()
            .unwrap();
        let classifier = Classifier::new(Arc::new(policy));
        let decision = classifier.classify("https://example.com/upload/");
        assert_eq!(decision.matched_rule.map(|r| r.kind()), Some(crate::RuleKind::Pattern));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = Classifier::new(scenario_policy());
        let urls = [
            "https://api.automa.site/ping",
            "https://www.googleapis.com/drive/v3/files?q=x",
            "https://example.com/",
            "not a url",
        ];

        let first: Vec<_> = urls.iter().map(|u| classifier.classify(*u)).collect();
        for _ in 0..3 {
            let again: Vec<_> = urls.iter().rev().map(|u| classifier.classify(*u)).collect();
            let again: Vec<_> = again.into_iter().rev().collect();
            assert_eq!(first, again);
        }
    }
}
