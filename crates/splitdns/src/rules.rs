use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::UpstreamTarget;

/// Canonical FQDN form used for every rule, blocklist entry and cache key:
/// lower-case with a trailing dot.
pub fn normalize_fqdn(name: &str) -> String {
    let mut normalized = name.to_lowercase();
    if !normalized.ends_with('.') {
        normalized.push('.');
    }
    normalized
}

/// Outcome of matching a query name against the loaded rules.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The name is blocklisted and must be answered with NXDOMAIN
    Blocked,
    /// A rule matched, exactly or by suffix
    Matched { target: UpstreamTarget, rule: String },
    /// No rule matched; the common upstream applies
    Default { target: UpstreamTarget },
}

impl Resolution {
    pub fn target(&self) -> Option<&UpstreamTarget> {
        match self {
            Resolution::Blocked => None,
            Resolution::Matched { target, .. } | Resolution::Default { target } => Some(target),
        }
    }
}

/// Domain-to-upstream rules plus the blocklist. Built once at startup and
/// read-only afterwards, so request tasks share it without locking.
pub struct RuleSet {
    rules: HashMap<String, UpstreamTarget>,
    blocked: HashSet<String>,
    common: UpstreamTarget,
}

impl RuleSet {
    pub fn is_blocked(&self, qname: &str) -> bool {
        self.blocked.contains(normalize_fqdn(qname).as_str())
    }

    /// Resolves a query name to an upstream. The blocklist wins over
    /// everything, then an exact rule, then the longest matching suffix
    /// obtained by stripping the left-most label one at a time, and
    /// finally the common upstream.
    pub fn resolve(&self, qname: &str) -> Resolution {
        let name = normalize_fqdn(qname);

        if self.blocked.contains(name.as_str()) {
            return Resolution::Blocked;
        }

        if let Some(target) = self.rules.get(name.as_str()) {
            return Resolution::Matched {
                target: target.clone(),
                rule: name,
            };
        }

        let mut suffix = name.as_str();
        while let Some(dot_idx) = suffix.find('.') {
            suffix = &suffix[dot_idx + 1..];
            if suffix.is_empty() {
                break;
            }
            if let Some(target) = self.rules.get(suffix) {
                return Resolution::Matched {
                    target: target.clone(),
                    rule: suffix.to_string(),
                };
            }
        }

        Resolution::Default {
            target: self.common.clone(),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }
}

pub struct RuleSetBuilder {
    rules: HashMap<String, UpstreamTarget>,
    blocked: HashSet<String>,
    common: UpstreamTarget,
}

impl RuleSetBuilder {
    pub fn new(common: UpstreamTarget) -> Self {
        RuleSetBuilder {
            rules: HashMap::new(),
            blocked: HashSet::new(),
            common,
        }
    }

    pub fn add_rule(&mut self, domain: &str, target: UpstreamTarget) {
        self.rules.insert(normalize_fqdn(domain), target);
    }

    pub fn add_blocked(&mut self, domain: &str) {
        self.blocked.insert(normalize_fqdn(domain));
    }

    /// Registers every domain listed in `path` for `target`. A missing or
    /// unreadable file only logs a warning: the proxy keeps serving with
    /// whatever rules did load.
    pub async fn load_rules(&mut self, path: &Path, target: UpstreamTarget) {
        match read_domain_lines(path).await {
            Ok(domains) => {
                tracing::debug!(path = %path.display(), count = domains.len(), "loaded rules file");
                for domain in domains {
                    self.add_rule(&domain, target.clone());
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping unreadable rules file: {:#}", e);
            }
        }
    }

    /// Same loose-failure policy as `load_rules`: an unreadable blocklist
    /// yields an empty one.
    pub async fn load_blocklist(&mut self, path: &Path) {
        match read_domain_lines(path).await {
            Ok(domains) => {
                tracing::debug!(path = %path.display(), count = domains.len(), "loaded blocklist file");
                for domain in domains {
                    self.add_blocked(&domain);
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping unreadable blocklist file: {:#}", e);
            }
        }
    }

    pub fn build(self) -> RuleSet {
        RuleSet {
            rules: self.rules,
            blocked: self.blocked,
            common: self.common,
        }
    }
}

/// Reads a line-oriented domain file: one FQDN per line, surrounding
/// whitespace trimmed, blank lines and `#` comments skipped.
async fn read_domain_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("error while opening '{}'", path.display()))?;

    let mut lines = BufReader::new(file).lines();
    let mut domains = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| format!("error while reading a line from '{}'", path.display()))?
    {
        let domain = line.trim();
        if domain.is_empty() || domain.starts_with('#') {
            continue;
        }
        domains.push(domain.to_string());
    }

    Ok(domains)
}
