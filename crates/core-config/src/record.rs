//! The authoritative block configuration record

use crate::domain::{host_matches, normalize_domain, normalize_path_prefix};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use steadfast_core_lock::{LockSummary, ProtectionLevel};

/// Domain whose listed path prefixes stay reachable while the domain is blocked
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlException {
    pub domain: String,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

impl UrlException {
    /// Build a normalised exception
    pub fn new<S: AsRef<str>>(domain: &str, paths: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut exception = UrlException {
            domain: normalize_domain(domain)?,
            allowed_paths: Vec::new(),
        };
        exception.merge_paths(paths)?;
        Ok(exception)
    }

    /// Append prefixes not already present, preserving order
    fn merge_paths<S: AsRef<str>>(&mut self, paths: impl IntoIterator<Item = S>) -> Result<()> {
        for path in paths {
            let prefix = normalize_path_prefix(path.as_ref())?;
            if !self.allowed_paths.contains(&prefix) {
                self.allowed_paths.push(prefix);
            }
        }
        Ok(())
    }

    /// Whether a navigation to `host` + `path` is covered by this exception
    pub fn allows(&self, host: &str, path: &str) -> bool {
        host_matches(host, &self.domain)
            && self
                .allowed_paths
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// What the authority publishes and every agent enforces
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConfiguration {
    #[serde(default)]
    pub blocked_domains: BTreeSet<String>,
    #[serde(default)]
    pub blocked_apps: BTreeSet<String>,
    #[serde(default)]
    pub is_blocking: bool,
    #[serde(default)]
    pub url_exceptions: Vec<UrlException>,
    #[serde(default)]
    pub lock_state: LockSummary,
    #[serde(default)]
    pub protection_level: ProtectionLevel,
}

impl BlockConfiguration {
    /// Add domains after normalising all of them. Returns how many were new.
    ///
    /// Nothing is inserted if any input fails to normalise.
    pub fn add_domains<S: AsRef<str>>(
        &mut self,
        domains: impl IntoIterator<Item = S>,
    ) -> Result<usize> {
        let normalized = normalize_all(domains)?;
        Ok(normalized
            .into_iter()
            .filter(|d| self.blocked_domains.insert(d.clone()))
            .count())
    }

    /// Remove domains. Returns how many were present.
    pub fn remove_domains<S: AsRef<str>>(
        &mut self,
        domains: impl IntoIterator<Item = S>,
    ) -> Result<usize> {
        let normalized = normalize_all(domains)?;
        Ok(normalized
            .iter()
            .filter(|d| self.blocked_domains.remove(d.as_str()))
            .count())
    }

    pub fn add_apps<S: AsRef<str>>(&mut self, apps: impl IntoIterator<Item = S>) -> usize {
        apps.into_iter()
            .map(|a| a.as_ref().trim().to_string())
            .filter(|a| !a.is_empty())
            .filter(|a| self.blocked_apps.insert(a.clone()))
            .count()
    }

    pub fn remove_apps<S: AsRef<str>>(&mut self, apps: impl IntoIterator<Item = S>) -> usize {
        apps.into_iter()
            .filter(|a| self.blocked_apps.remove(a.as_ref().trim()))
            .count()
    }

    /// Add an exception or extend an existing one with more prefixes
    pub fn add_exception<S: AsRef<str>>(
        &mut self,
        domain: &str,
        paths: impl IntoIterator<Item = S>,
    ) -> Result<()> {
        let incoming = UrlException::new(domain, paths)?;
        match self
            .url_exceptions
            .iter_mut()
            .find(|e| e.domain == incoming.domain)
        {
            Some(existing) => existing.merge_paths(incoming.allowed_paths)?,
            None => self.url_exceptions.push(incoming),
        }
        Ok(())
    }

    /// Drop the exception for `domain`. Returns whether one existed.
    pub fn remove_exception(&mut self, domain: &str) -> Result<bool> {
        let domain = normalize_domain(domain)?;
        let before = self.url_exceptions.len();
        self.url_exceptions.retain(|e| e.domain != domain);
        Ok(self.url_exceptions.len() != before)
    }

    pub fn exception_for(&self, domain: &str) -> Option<&UrlException> {
        self.url_exceptions.iter().find(|e| e.domain == domain)
    }
}

fn normalize_all<S: AsRef<str>>(domains: impl IntoIterator<Item = S>) -> Result<Vec<String>> {
    domains
        .into_iter()
        .map(|d| normalize_domain(d.as_ref()))
        .collect()
}

/// A configuration as read back from the store, with its version stamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedConfig {
    pub version: u64,
    pub published_at: DateTime<Utc>,
    #[serde(flatten)]
    pub config: BlockConfiguration,
}
