//! Syar Policy
//!
//! Declarative allow/block policy and the pure URL classifier that
//! evaluates it.
//!
//! Evaluation order is fixed and cannot be changed by configuration:
//! 1. Allow-list (host or subdomain) → Allow
//! 2. Blocked host (exact or subdomain) → Block
//! 3. URL patterns, in list order → Block
//! 4. Keyword substrings → Block
//! 5. Anything else → Allow
//!
//! Targets that cannot be parsed are allowed (fail-open).

mod classifier;
mod config;
mod policy;
mod rule;

pub use classifier::{Classifier, Decision, Outcome, UrlLike};
pub use config::{parse_config, ConfigError, ConfigFormat, PatternConfig, PolicyConfig};
pub use policy::{Policy, PolicyBuilder, PolicyError};
pub use rule::{host_matches, AllowEntry, PatternRule, Rule, RuleKind, RuleSummary};
