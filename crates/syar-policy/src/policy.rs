//! Policy Table
//!
//! Immutable rule tables built once at load time. The only way to change
//! a policy is to build a new one and reinstall the guard.

use crate::rule::{normalize_host_entry, AllowEntry, PatternRule, Rule, RuleSummary};
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::info;

/// Errors while building a policy
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid block pattern '{pattern}': {source}")]
    PatternCompile {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Empty rule entry: {0:?}")]
    EmptyEntry(String),

    #[error("Keyword index build failed: {0}")]
    KeywordIndex(#[from] aho_corasick::BuildError),
}

/// Immutable allow/block policy
#[derive(Debug, Clone)]
pub struct Policy {
    allow: BTreeSet<AllowEntry>,
    block_hosts: BTreeSet<String>,
    block_patterns: Vec<PatternRule>,
    block_keywords: Vec<String>,
    /// Multi-pattern automaton over the lower-cased keywords
    keyword_index: Option<AhoCorasick>,
}

impl Policy {
    /// Start building a policy
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    /// Policy with no rules: every target is allowed
    pub fn empty() -> Self {
        Self {
            allow: BTreeSet::new(),
            block_hosts: BTreeSet::new(),
            block_patterns: Vec::new(),
            block_keywords: Vec::new(),
            keyword_index: None,
        }
    }

    pub fn allow_list(&self) -> impl Iterator<Item = &AllowEntry> {
        self.allow.iter()
    }

    pub fn block_hosts(&self) -> impl Iterator<Item = &str> {
        self.block_hosts.iter().map(String::as_str)
    }

    pub fn block_patterns(&self) -> &[PatternRule] {
        &self.block_patterns
    }

    pub fn block_keywords(&self) -> &[String] {
        &self.block_keywords
    }

    /// Number of rules of every kind, allow entries included
    pub fn rule_count(&self) -> usize {
        self.allow.len() + self.block_hosts.len() + self.block_patterns.len() + self.block_keywords.len()
    }

    /// Find the allow entry covering `host` (exact or parent domain)
    pub fn allowing_entry(&self, host: &str) -> Option<&AllowEntry> {
        if host.is_empty() || self.allow.is_empty() {
            return None;
        }
        self.allow.iter().find(|entry| entry.matches(host))
    }

    /// Find the blocked host covering `host`.
    ///
    /// The exact host is checked first, then each parent domain, nearest first.
    pub fn blocking_host(&self, host: &str) -> Option<&str> {
        if host.is_empty() {
            return None;
        }

        let mut part = host;
        loop {
            if let Some(found) = self.block_hosts.get(part) {
                return Some(found.as_str());
            }

            // Strip leading label
            match part.find('.') {
                Some(idx) if idx + 1 < part.len() => part = &part[idx + 1..],
                _ => return None,
            }
        }
    }

    /// First pattern (in list order) matching the host or full URL
    pub fn matching_pattern(&self, host: &str, url: &str) -> Option<&PatternRule> {
        self.block_patterns.iter().find(|p| p.matches(host, url))
    }

    /// Keyword found in `url`; `url` must already be lower-cased
    pub fn matching_keyword(&self, url: &str) -> Option<&str> {
        let index = self.keyword_index.as_ref()?;
        index
            .find(url)
            .map(|m| self.block_keywords[m.pattern().as_usize()].as_str())
    }

    /// All block rules in precedence order
    pub fn rules(&self) -> Vec<Rule> {
        self.block_hosts
            .iter()
            .map(|h| Rule::ExactHost(h.clone()))
            .chain(self.block_patterns.iter().cloned().map(Rule::Pattern))
            .chain(self.block_keywords.iter().map(|k| Rule::Keyword(k.clone())))
            .collect()
    }

    /// Allow entries followed by block rules, in precedence order
    pub fn summaries(&self) -> Vec<RuleSummary> {
        self.allow
            .iter()
            .map(AllowEntry::summary)
            .chain(self.rules().iter().map(Rule::summary))
            .collect()
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::empty()
    }
}

/// Collects raw rule text and compiles it into a [`Policy`].
///
/// Nothing is validated until [`PolicyBuilder::build`], which fails as a
/// whole if any single entry is invalid.
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    allow: Vec<String>,
    block_hosts: Vec<String>,
    block_patterns: Vec<(String, bool)>,
    block_keywords: Vec<String>,
}

impl PolicyBuilder {
    pub fn allow(mut self, host: impl Into<String>) -> Self {
        self.allow.push(host.into());
        self
    }

    pub fn allow_all<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow.extend(hosts.into_iter().map(Into::into));
        self
    }

    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.block_hosts.push(host.into());
        self
    }

    pub fn block_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.block_hosts.extend(hosts.into_iter().map(Into::into));
        self
    }

    /// Add a case-insensitive URL pattern
    pub fn block_pattern(self, pattern: impl Into<String>) -> Self {
        self.block_pattern_with_case(pattern, false)
    }

    pub fn block_pattern_with_case(mut self, pattern: impl Into<String>, case_sensitive: bool) -> Self {
        self.block_patterns.push((pattern.into(), case_sensitive));
        self
    }

    pub fn block_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.block_keywords.push(keyword.into());
        self
    }

    pub fn block_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.block_keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    /// Compile every rule. Any invalid entry fails the whole policy.
    pub fn build(self) -> Result<Policy, PolicyError> {
        let allow = self
            .allow
            .iter()
            .map(|h| AllowEntry::new(h))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let block_hosts = self
            .block_hosts
            .iter()
            .map(|h| normalize_host_entry(h))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let block_patterns = self
            .block_patterns
            .iter()
            .map(|(p, case_sensitive)| PatternRule::new(p, *case_sensitive))
            .collect::<Result<Vec<_>, _>>()?;

        let mut block_keywords = Vec::with_capacity(self.block_keywords.len());
        for raw in &self.block_keywords {
            let keyword = raw.to_lowercase();
            if keyword.trim().is_empty() {
                return Err(PolicyError::EmptyEntry(raw.clone()));
            }
            if !block_keywords.contains(&keyword) {
                block_keywords.push(keyword);
            }
        }

        let keyword_index = if block_keywords.is_empty() {
            None
        } else {
            Some(
                AhoCorasickBuilder::new()
                    .match_kind(MatchKind::LeftmostFirst)
                    .build(&block_keywords)?,
            )
        };

        info!(
            "Policy loaded: {} allow, {} hosts, {} patterns, {} keywords",
            allow.len(),
            block_hosts.len(),
            block_patterns.len(),
            block_keywords.len()
        );

        Ok(Policy {
            allow,
            block_hosts,
            block_patterns,
            block_keywords,
            keyword_index,
        })
    }
}
