//! Session cookie persistence across research runs.
//!
//! Cookies earned on a domain (clearance tokens included) are kept for a
//! bounded time so later runs look like a returning visitor. The store is
//! advisory: losing it only degrades challenge evasion, never correctness,
//! so every failure path here is non-fatal. Writes use the temp-file +
//! rename pattern to survive a crash mid-write; concurrent writers get
//! last-write-wins per domain.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

const STORE_FILE: &str = "cookies.json";

/// Cookies for one domain with their save time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DomainCookies {
    /// `name=value` pairs, attributes already stripped.
    pairs: Vec<String>,
    saved_at: DateTime<Utc>,
}

/// Domain-keyed, TTL-bounded cookie store backed by a JSON file.
#[derive(Debug)]
pub struct CookieStore {
    path: PathBuf,
    ttl: Duration,
    entries: BTreeMap<String, DomainCookies>,
}

impl CookieStore {
    /// Load the store from `base_dir`, discarding expired entries.
    ///
    /// A missing or corrupt file yields an empty store.
    pub fn load(base_dir: &Path, ttl_secs: u64) -> Self {
        let path = base_dir.join(STORE_FILE);
        let ttl = Duration::seconds(ttl_secs as i64);

        let mut entries: BTreeMap<String, DomainCookies> = std::fs::read_to_string(&path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();

        let now = Utc::now();
        entries.retain(|_, e| now - e.saved_at <= ttl);

        Self { path, ttl, entries }
    }

    /// Cookie header value for a domain, or `None` when nothing fresh is
    /// stored.
    pub fn cookies_for(&self, domain: &str) -> Option<String> {
        let entry = self.entries.get(domain)?;
        if Utc::now() - entry.saved_at > self.ttl || entry.pairs.is_empty() {
            return None;
        }
        Some(entry.pairs.join("; "))
    }

    /// Record `Set-Cookie` values for a domain, replacing what was there.
    ///
    /// Attributes after the first `;` are dropped; only `name=value` is
    /// replayed on later requests.
    pub fn record(&mut self, domain: &str, set_cookies: &[String]) {
        let pairs: Vec<String> = set_cookies
            .iter()
            .filter_map(|c| {
                let pair = c.split(';').next()?.trim();
                pair.contains('=').then(|| pair.to_string())
            })
            .collect();
        if pairs.is_empty() {
            return;
        }
        self.entries.insert(
            domain.to_string(),
            DomainCookies {
                pairs,
                saved_at: Utc::now(),
            },
        );
    }

    /// Persist the store atomically.
    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(io::Error::other)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)
    }

    /// Number of domains with stored cookies.
    pub fn domain_count(&self) -> usize {
        self.entries.len()
    }
}
