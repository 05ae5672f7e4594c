//! Explicit cookie jar
//!
//! The remote backend is cookie-driven: authentication is detected by
//! inspecting named cookies and their expiries, and a filtered subset is
//! persisted between runs. A plain opaque client-side store is not enough,
//! so the jar parses and tracks cookies itself.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One cookie as observed on a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Absent for session-lifetime cookies
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires, Some(expiry) if expiry <= now)
    }

    /// Remaining lifetime; `None` for session-lifetime cookies
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires.map(|expiry| expiry - now)
    }
}

/// Parses a single `Set-Cookie` header value
///
/// Only the attributes the session logic needs are interpreted: `Max-Age`
/// (which wins over `Expires`, per RFC 6265) and `Expires`.
pub fn parse_set_cookie(raw: &str, now: DateTime<Utc>) -> Option<Cookie> {
    let mut parts = raw.split(';');
    let pair = parts.next()?.trim();
    let eq = pair.find('=')?;
    let (name, value) = pair.split_at(eq);
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value[1..].trim().to_string();

    let mut expires: Option<DateTime<Utc>> = None;
    let mut max_age: Option<i64> = None;
    for attr in parts {
        let attr = attr.trim();
        let (attr_name, attr_value) = match attr.find('=') {
            Some(idx) => (&attr[..idx], attr[idx + 1..].trim()),
            None => (attr, ""),
        };
        if attr_name.eq_ignore_ascii_case("max-age") {
            max_age = attr_value.parse().ok();
        } else if attr_name.eq_ignore_ascii_case("expires") {
            expires = DateTime::parse_from_rfc2822(attr_value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }

    let expires = match max_age {
        Some(seconds) => Some(now + Duration::seconds(seconds)),
        None => expires,
    };

    Some(Cookie {
        name: name.to_string(),
        value,
        expires,
    })
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct PersistedState {
    cookies: Vec<Cookie>,
}

/// Cookie jar scoped to one session context
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: BTreeMap<String, Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every `Set-Cookie` header of a response
    pub fn store_response_cookies<'a>(
        &mut self,
        headers: impl Iterator<Item = &'a str>,
        now: DateTime<Utc>,
    ) {
        for raw in headers {
            if let Some(cookie) = parse_set_cookie(raw, now) {
                self.cookies.insert(cookie.name.clone(), cookie);
            }
        }
    }

    pub fn insert(&mut self, cookie: Cookie) {
        self.cookies.insert(cookie.name.clone(), cookie);
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.cookies.keys().map(String::as_str).collect()
    }

    /// Renders the `Cookie` request header from non-expired cookies
    pub fn header_value(&self, now: DateTime<Utc>) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies
            .values()
            .filter(|cookie| !cookie.is_expired(now))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Writes a filtered snapshot to disk, skipping the given transient
    /// cookie names. Returns false (without writing) when nothing would
    /// survive the filter.
    pub fn persist_filtered(&self, path: &Path, skip_names: &[&str]) -> std::io::Result<bool> {
        let cookies: Vec<Cookie> = self
            .cookies
            .values()
            .filter(|cookie| {
                !skip_names
                    .iter()
                    .any(|name| cookie.name.eq_ignore_ascii_case(name))
            })
            .cloned()
            .collect();
        if cookies.is_empty() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let state = PersistedState { cookies };
        let payload = serde_json::to_string_pretty(&state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, payload)?;
        Ok(true)
    }

    /// Loads a persisted snapshot, dropping cookies that expired on disk
    pub fn load_persisted(path: &Path, now: DateTime<Utc>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: PersistedState = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut jar = Self::new();
        for cookie in state.cookies {
            if !cookie.is_expired(now) {
                jar.insert(cookie);
            }
        }
        Ok(jar)
    }
}
