//! Observable classification and normalization.

use crate::core::errors::{AnalyzerError, ErrorKind};
use crate::hashing::is_hex_digest;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

static RE_URL_FULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^(?:https?|ftp)://[^\s'"<>]+$"#).expect("valid url regex")
});

static RE_DOMAIN_FULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^(?:[a-z0-9](?:[a-z0-9\-]{0,61}[a-z0-9])?\.)+[a-z][a-z0-9\-]{0,61}[a-z0-9]$"#)
        .expect("valid domain regex")
});

/// Classification of a non-file target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservableKind {
    Hash,
    Url,
    Domain,
    Ip,
}

impl fmt::Display for ObservableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObservableKind::Hash => "hash",
            ObservableKind::Url => "url",
            ObservableKind::Domain => "domain",
            ObservableKind::Ip => "ip",
        };
        f.write_str(s)
    }
}

/// A normalized observable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observable {
    pub kind: ObservableKind,
    pub value: String,
}

impl Observable {
    /// Normalize and validate `raw`.
    ///
    /// With a declared classification the value must match it; without one
    /// the classification is inferred. Hashes and domains are lowercased,
    /// IPs are re-rendered in canonical form, URLs are only trimmed.
    pub fn parse(raw: &str, declared: Option<ObservableKind>) -> Result<Self, AnalyzerError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AnalyzerError::new(
                ErrorKind::InvalidObservable,
                "empty observable",
            ));
        }

        let kind = match declared {
            Some(kind) => kind,
            None => classify(trimmed).ok_or_else(|| {
                AnalyzerError::new(
                    ErrorKind::InvalidObservable,
                    format!("cannot classify observable '{}'", trimmed),
                )
            })?,
        };

        let value = normalize(trimmed, kind).ok_or_else(|| {
            AnalyzerError::new(
                ErrorKind::InvalidObservable,
                format!("'{}' is not a valid {}", trimmed, kind),
            )
        })?;

        Ok(Self { kind, value })
    }

    /// Length-based hash algorithm name, for hash observables.
    pub fn hash_algorithm(&self) -> Option<&'static str> {
        if self.kind != ObservableKind::Hash {
            return None;
        }
        match self.value.len() {
            32 => Some("md5"),
            40 => Some("sha1"),
            64 => Some("sha256"),
            _ => None,
        }
    }
}

/// Infer the classification of a trimmed observable string.
pub fn classify(value: &str) -> Option<ObservableKind> {
    if value.parse::<IpAddr>().is_ok() {
        return Some(ObservableKind::Ip);
    }
    if is_hash(value) {
        return Some(ObservableKind::Hash);
    }
    if RE_URL_FULL.is_match(value) {
        return Some(ObservableKind::Url);
    }
    if RE_DOMAIN_FULL.is_match(value) {
        return Some(ObservableKind::Domain);
    }
    None
}

fn is_hash(value: &str) -> bool {
    [32, 40, 64].iter().any(|&len| is_hex_digest(value, len))
}

fn normalize(value: &str, kind: ObservableKind) -> Option<String> {
    match kind {
        ObservableKind::Ip => value.parse::<IpAddr>().ok().map(|ip| ip.to_string()),
        ObservableKind::Hash => is_hash(value).then(|| value.to_ascii_lowercase()),
        ObservableKind::Url => RE_URL_FULL.is_match(value).then(|| value.to_string()),
        ObservableKind::Domain => {
            let lowered = value.trim_end_matches('.').to_ascii_lowercase();
            RE_DOMAIN_FULL.is_match(&lowered).then_some(lowered)
        }
    }
}
