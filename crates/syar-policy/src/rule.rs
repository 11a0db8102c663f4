//! Policy rules
//!
//! A rule is one of three shapes: an exact host (which also covers its
//! subdomains), a compiled URL pattern, or a keyword substring.

use crate::policy::PolicyError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a block rule, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Allow-list entry (never blocks)
    Allow,
    /// Blocked host
    ExactHost,
    /// Blocked URL pattern
    Pattern,
    /// Blocked keyword substring
    Keyword,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::ExactHost => write!(f, "host"),
            Self::Pattern => write!(f, "pattern"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

/// A compiled URL pattern
#[derive(Debug, Clone)]
pub struct PatternRule {
    source: String,
    regex: Regex,
    case_sensitive: bool,
}

impl PatternRule {
    /// Compile a pattern. Patterns are case-insensitive unless asked otherwise.
    pub fn new(source: &str, case_sensitive: bool) -> Result<Self, PolicyError> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| PolicyError::PatternCompile {
                pattern: source.to_string(),
                source: e,
            })?;

        Ok(Self {
            source: source.to_string(),
            regex,
            case_sensitive,
        })
    }

    /// Pattern text as configured
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Test against the hostname first, then the full URL
    #[inline]
    pub fn matches(&self, host: &str, url: &str) -> bool {
        (!host.is_empty() && self.regex.is_match(host)) || self.regex.is_match(url)
    }
}

impl PartialEq for PatternRule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.case_sensitive == other.case_sensitive
    }
}

impl Eq for PatternRule {}

/// A single block rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Blocks the host and all of its subdomains
    ExactHost(String),
    /// Blocks hosts or URLs matching a regular expression
    Pattern(PatternRule),
    /// Blocks URLs containing the substring (case-insensitive)
    Keyword(String),
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::ExactHost(_) => RuleKind::ExactHost,
            Self::Pattern(_) => RuleKind::Pattern,
            Self::Keyword(_) => RuleKind::Keyword,
        }
    }

    /// Rule text, without the kind prefix
    pub fn value(&self) -> &str {
        match self {
            Self::ExactHost(host) => host,
            Self::Pattern(pattern) => pattern.as_str(),
            Self::Keyword(keyword) => keyword,
        }
    }

    pub fn summary(&self) -> RuleSummary {
        RuleSummary {
            kind: self.kind(),
            value: self.value().to_string(),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.value())
    }
}

/// Allow-list entry: matches the host itself and any subdomain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllowEntry(String);

impl AllowEntry {
    pub fn new(host: &str) -> Result<Self, PolicyError> {
        normalize_host_entry(host).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn matches(&self, host: &str) -> bool {
        host_matches(host, &self.0)
    }

    pub fn summary(&self) -> RuleSummary {
        RuleSummary {
            kind: RuleKind::Allow,
            value: self.0.clone(),
        }
    }
}

impl fmt::Display for AllowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serializable description of a rule, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub kind: RuleKind,
    pub value: String,
}

/// Check whether `host` is `entry` or a subdomain of it.
///
/// Matching is label-aware: `notautoma.site` does not match `automa.site`.
#[inline]
pub fn host_matches(host: &str, entry: &str) -> bool {
    if host.len() == entry.len() {
        return host == entry;
    }
    host.len() > entry.len()
        && host.ends_with(entry)
        && host.as_bytes()[host.len() - entry.len() - 1] == b'.'
}

/// Lower-case a configured host and strip wildcard prefixes (`*.`, `.`)
pub(crate) fn normalize_host_entry(raw: &str) -> Result<String, PolicyError> {
    let host = raw
        .trim()
        .trim_start_matches("*.")
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase();

    if host.is_empty() {
        return Err(PolicyError::EmptyEntry(raw.to_string()));
    }
    Ok(host)
}
