//! IOC classification of extracted strings.

use super::patterns;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;

/// Upper bound on indicators kept per category
pub const MAX_PER_CATEGORY: usize = 100;

static VALID_TLDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "com", "org", "net", "edu", "gov", "mil", "int", "info", "biz", "name", "pro", "uk", "us",
        "ca", "au", "de", "fr", "it", "es", "nl", "se", "no", "fi", "dk", "be", "ch", "at", "pl",
        "ru", "su", "cn", "jp", "kr", "in", "br", "mx", "ar", "za", "ua", "by", "kz", "ir", "tr",
        "ro", "bg", "cz", "hu", "gr", "pt", "ie", "nz", "hk", "tw", "sg", "vn", "th", "id", "my",
        "io", "ai", "app", "dev", "tech", "cloud", "online", "store", "site", "xyz", "top", "club",
        "live", "space", "website", "icu", "cc", "tk", "ml", "ga", "cf", "gq", "pw", "ws", "me",
        "tv", "co", "onion", "bit",
    ]
    .into_iter()
    .collect()
});

// Suffixes that look like TLDs but name files
const FILE_EXTENSIONS: &[&str] = &[
    "exe", "dll", "sys", "ocx", "cpl", "scr", "drv", "bat", "cmd", "ps1", "vbs", "js", "jar",
    "class", "txt", "log", "ini", "cfg", "xml", "json", "html", "htm", "pdf", "doc", "docx",
    "xls", "xlsx", "rtf", "zip", "rar", "cab", "tmp", "dat", "bin", "pdb", "lib", "obj", "png",
    "jpg", "gif", "bmp", "ico",
];

/// Indicators found in a set of strings, sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IocSummary {
    pub urls: BTreeSet<String>,
    pub emails: BTreeSet<String>,
    pub ipv4: BTreeSet<String>,
    pub domains: BTreeSet<String>,
    pub registry_keys: BTreeSet<String>,
    pub windows_paths: BTreeSet<String>,
}

impl IocSummary {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
            && self.emails.is_empty()
            && self.ipv4.is_empty()
            && self.domains.is_empty()
            && self.registry_keys.is_empty()
            && self.windows_paths.is_empty()
    }

    pub fn total(&self) -> usize {
        self.urls.len()
            + self.emails.len()
            + self.ipv4.len()
            + self.domains.len()
            + self.registry_keys.len()
            + self.windows_paths.len()
    }
}

fn insert_capped(set: &mut BTreeSet<String>, value: &str) {
    if set.len() < MAX_PER_CATEGORY {
        set.insert(value.to_string());
    }
}

/// Undo common defanging (`hxxp://`, `[.]`, `(.)`).
pub fn refang(s: &str) -> Cow<'_, str> {
    if !(s.contains("hxxp") || s.contains("[.]") || s.contains("(.)")) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.replace("hxxps://", "https://")
            .replace("hxxp://", "http://")
            .replace("[.]", ".")
            .replace("(.)", "."),
    )
}

/// Public, routable addresses that are not version-number lookalikes.
fn is_network_ipv4(ip: &Ipv4Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_private() || ip.is_link_local() {
        return false;
    }
    if ip.is_broadcast() || ip.is_documentation() || ip.is_multicast() {
        return false;
    }
    let o = ip.octets();
    // x.0.0.y style version strings
    !(o[0] < 10 && o[1] == 0 && o[2] == 0)
}

fn is_domain(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.split('.').collect();
    if parts.len() < 2 || parts.len() > 6 {
        return false;
    }
    let tld = parts[parts.len() - 1];
    if FILE_EXTENSIONS.contains(&tld) || !VALID_TLDS.contains(tld) {
        return false;
    }
    let sld = parts[parts.len() - 2];
    sld.chars().any(|c| c.is_ascii_alphabetic())
}

/// Classify strings into IOC categories.
pub fn classify_strings<'a>(texts: impl IntoIterator<Item = &'a str>) -> IocSummary {
    let mut summary = IocSummary::default();

    for raw in texts {
        let text = refang(raw);
        let text = text.as_ref();

        let mut url_hosts: HashSet<String> = HashSet::new();
        for m in patterns::RE_URL.find_iter(text) {
            let url = m.as_str().trim_end_matches(['.', ',', ')', ';']);
            insert_capped(&mut summary.urls, url);
            if let Some(host) = url.split("://").nth(1).and_then(|r| r.split(['/', ':', '?']).next()) {
                url_hosts.insert(host.to_ascii_lowercase());
            }
        }

        for m in patterns::RE_EMAIL.find_iter(text) {
            insert_capped(&mut summary.emails, &m.as_str().to_ascii_lowercase());
        }

        for m in patterns::RE_IPV4_CANDIDATE.find_iter(text) {
            if let Ok(ip) = m.as_str().parse::<Ipv4Addr>() {
                if is_network_ipv4(&ip) {
                    insert_capped(&mut summary.ipv4, &ip.to_string());
                }
            }
        }

        for m in patterns::RE_HOSTNAME.find_iter(text) {
            let host = m.as_str().to_ascii_lowercase();
            if host.parse::<Ipv4Addr>().is_ok() {
                continue;
            }
            // '@' immediately before the match means the host belongs to an email
            if text[..m.start()].ends_with('@') && !url_hosts.contains(&host) {
                continue;
            }
            if is_domain(&host) {
                insert_capped(&mut summary.domains, &host);
            }
        }

        for m in patterns::RE_REGISTRY.find_iter(text) {
            insert_capped(&mut summary.registry_keys, m.as_str().trim_end());
        }

        for m in patterns::RE_PATH_WINDOWS.find_iter(text) {
            insert_capped(&mut summary.windows_paths, m.as_str());
        }
    }

    summary
}
