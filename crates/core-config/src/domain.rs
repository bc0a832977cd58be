//! Domain and path-prefix normalisation shared by the authority and agents

use crate::error::{ConfigError, Result};

const MAX_DOMAIN_LEN: usize = 253;

/// Normalise user input into a bare lower-case host name.
///
/// Accepts things like `https://WWW.Example.com:8443/path`, `*.example.com`
/// or `example.com.` and returns `example.com`.
pub fn normalize_domain(input: &str) -> Result<String> {
    let invalid = || ConfigError::InvalidDomain(input.to_string());

    let mut rest = input.trim().to_ascii_lowercase();
    if let Some(idx) = rest.find("://") {
        rest = rest[idx + 3..].to_string();
    }
    if let Some(idx) = rest.find(['/', '?', '#']) {
        rest.truncate(idx);
    }
    if let Some(idx) = rest.rfind('@') {
        rest = rest[idx + 1..].to_string();
    }
    if let Some(idx) = rest.find(':') {
        rest.truncate(idx);
    }

    let mut host = rest.trim_end_matches('.');
    host = host.strip_prefix("*.").unwrap_or(host);
    host = host.strip_prefix("www.").unwrap_or(host);

    if host.is_empty() || host.len() > MAX_DOMAIN_LEN {
        return Err(invalid());
    }
    let valid_labels = host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    if !valid_labels {
        return Err(invalid());
    }

    Ok(host.to_string())
}

/// Normalise an allowed path prefix: trimmed, always starting with `/`.
pub fn normalize_path_prefix(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidPathPrefix(input.to_string()));
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{}", trimmed))
    }
}

/// Whether `host` is `domain` itself or one of its subdomains
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}
