//! Per-host session cookie store.
//!
//! One store is shared by every request the client issues, including the
//! concurrent thumbnail fetches, by plugging it into the shared
//! `reqwest::Client` as a cookie provider. Cookies stored for one host are
//! never attached to requests targeting another host.

use reqwest::header::HeaderValue;
use std::collections::HashMap;
use std::sync::RwLock;
use url::Url;

/// Host-keyed cookie sets. Each response from a host replaces that host's
/// full set (last-write-wins, no merging). No expiry handling - cookies are
/// trusted as returned by the server until `clear()`.
#[derive(Debug, Default)]
pub struct SessionStore {
    cookies: RwLock<HashMap<String, Vec<String>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored cookie set for `host` with `cookies`
    /// (`name=value` pairs).
    pub fn save(&self, host: &str, cookies: Vec<String>) {
        let mut store = self.cookies.write().unwrap();
        store.insert(host.to_string(), cookies);
    }

    /// Stored cookie pairs for `host`, or empty if none.
    pub fn load(&self, host: &str) -> Vec<String> {
        let store = self.cookies.read().unwrap();
        store.get(host).cloned().unwrap_or_default()
    }

    /// Drop all sessions (logout).
    pub fn clear(&self) {
        let mut store = self.cookies.write().unwrap();
        store.clear();
    }

    pub fn has_session(&self, host: &str) -> bool {
        let store = self.cookies.read().unwrap();
        store.get(host).map(|c| !c.is_empty()).unwrap_or(false)
    }
}

impl reqwest::cookie::CookieStore for SessionStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };

        // Keep only the name=value pair of each Set-Cookie header; the
        // attributes (Path, HttpOnly, ...) are not needed for replay.
        let pairs: Vec<String> = cookie_headers
            .filter_map(|header| header.to_str().ok())
            .filter_map(|raw| raw.split(';').next())
            .map(|pair| pair.trim().to_string())
            .filter(|pair| !pair.is_empty())
            .collect();

        if pairs.is_empty() {
            return;
        }

        log::debug!("Storing {} cookie(s) for {}", pairs.len(), host);
        self.save(host, pairs);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?;
        let stored = self.load(host);
        if stored.is_empty() {
            return None;
        }
        HeaderValue::from_str(&stored.join("; ")).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore as _;

    #[test]
    fn test_save_load_clear() {
        let store = SessionStore::new();
        assert!(store.load("server.local").is_empty());

        store.save("server.local", vec!["session=abc".to_string()]);
        assert_eq!(store.load("server.local"), vec!["session=abc".to_string()]);
        assert!(store.has_session("server.local"));

        store.clear();
        assert!(store.load("server.local").is_empty());
        assert!(!store.has_session("server.local"));
    }

    #[test]
    fn test_save_replaces_full_set() {
        let store = SessionStore::new();
        store.save(
            "server.local",
            vec!["session=old".to_string(), "theme=dark".to_string()],
        );
        store.save("server.local", vec!["session=new".to_string()]);

        assert_eq!(store.load("server.local"), vec!["session=new".to_string()]);
    }

    #[test]
    fn test_cookies_keyed_by_host() {
        let store = SessionStore::new();
        let login_url = Url::parse("http://alpha.local/login").unwrap();
        let header = HeaderValue::from_static("session=tok-1; Path=/; HttpOnly");
        store.set_cookies(&mut [&header].into_iter(), &login_url);

        let same_host = Url::parse("http://alpha.local/browse/").unwrap();
        assert_eq!(
            store.cookies(&same_host).unwrap(),
            HeaderValue::from_static("session=tok-1")
        );

        // A different host must never see alpha's cookies
        let other_host = Url::parse("http://beta.local/browse/").unwrap();
        assert!(store.cookies(&other_host).is_none());
    }

    #[test]
    fn test_response_replaces_host_set() {
        let store = SessionStore::new();
        let url = Url::parse("http://alpha.local/login").unwrap();

        let first = HeaderValue::from_static("session=first; Path=/");
        store.set_cookies(&mut [&first].into_iter(), &url);

        let second = HeaderValue::from_static("session=second; Path=/");
        store.set_cookies(&mut [&second].into_iter(), &url);

        assert_eq!(
            store.cookies(&url).unwrap(),
            HeaderValue::from_static("session=second")
        );
    }
}
