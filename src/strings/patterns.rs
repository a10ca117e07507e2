//! Precompiled IOC patterns for extracted strings.
//!
//! Patterns only propose candidates; IPs and domains are validated after
//! matching.

use once_cell::sync::Lazy;
use regex::Regex;

pub static RE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?|ftp)://[^\s'"<>]+"#).expect("valid URL regex")
});

pub static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b"#).expect("valid email regex")
});

// RFC 1123-ish; labels 1-63, no leading/trailing hyphen
pub static RE_HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:[a-z0-9](?:[a-z0-9\-]{0,61}[a-z0-9])?)(?:\.(?:[a-z0-9](?:[a-z0-9\-]{0,61}[a-z0-9])?))+\b"#)
        .expect("valid hostname regex")
});

pub static RE_IPV4_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b(?:\d{1,3}\.){3}\d{1,3}\b"#).expect("valid ipv4 candidate regex"));

pub static RE_REGISTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:HKEY_(?:LOCAL_MACHINE|CURRENT_USER|CLASSES_ROOT|USERS|CURRENT_CONFIG)|HKLM|HKCU|HKCR|HKU|HKCC)\\[^\r\n\t"]+"#)
        .expect("valid registry regex")
});

pub static RE_PATH_WINDOWS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b[A-Z]:\\[^\s"<>|]+"#).expect("valid windows path regex")
});
