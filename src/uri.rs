//! Parsed URI values and the per-evaluator URI parse cache (spec component
//! C6, §4.6 and §4.8 `PARSE_URL`/`GET_PROPERTY`).

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// A parsed URI. Only the properties `GET_PROPERTY` knows about (§4.8) are
/// retained; percent-decoding is never applied to `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uri {
    raw: String,
    scheme: String,
    authority: String,
    path: String,
}

impl Uri {
    /// Parse a URI, or `None` on malformed input. Never panics or errors -
    /// `PARSE_URL` turns a `None` into the runtime value `null` (§4.8).
    pub fn parse(s: &str) -> Option<Uri> {
        let (scheme, rest) = s.split_once("://")?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
            return None;
        }
        let (authority, path) = match rest.find(['/', '?', '#']) {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return None;
        }
        Some(Uri {
            raw: s.to_string(),
            scheme: scheme.to_ascii_lowercase(),
            authority: authority.to_string(),
            path: path.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Raw path, no percent-decoding, preserving encoding (§4.8).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Host, optional `:port`, no userinfo (§4.8).
    pub fn authority(&self) -> &str {
        match self.authority.rfind('@') {
            Some(idx) => &self.authority[idx + 1..],
            None => &self.authority,
        }
    }

    fn host(&self) -> &str {
        let authority = self.authority();
        if let Some(bracket_end) = authority.strip_prefix('[') {
            return bracket_end.split(']').next().unwrap_or("");
        }
        authority.split(':').next().unwrap_or(authority)
    }

    /// Path canonicalised per endpoint rules: empty -> `/`; leading `/`
    /// ensured; trailing `/` ensured (§4.8).
    pub fn normalized_path(&self) -> String {
        let mut p = self.path.to_string();
        if p.is_empty() {
            return "/".to_string();
        }
        if !p.starts_with('/') {
            p.insert(0, '/');
        }
        if !p.ends_with('/') {
            p.push('/');
        }
        p
    }

    /// True iff the host parses as an IPv4 or bracketed IPv6 literal (§4.8).
    pub fn is_ip(&self) -> bool {
        let authority = self.authority();
        if authority.starts_with('[') {
            return authority.contains(']');
        }
        let host = self.host();
        host.split('.').count() == 4
            && host.split('.').all(|octet| !octet.is_empty() && octet.parse::<u8>().is_ok())
    }
}

impl Uri {
    /// `GET_PROPERTY` semantics on a parsed Uri (§4.8): only the named
    /// properties below are defined; anything else yields `null`.
    pub fn property(&self, name: &str) -> crate::value::Value {
        use crate::value::Value;
        match name {
            "scheme" => Value::string(self.scheme().to_string()),
            "path" => Value::string(self.path().to_string()),
            "normalizedPath" => Value::string(self.normalized_path()),
            "authority" => Value::string(self.authority().to_string()),
            "isIp" => Value::Bool(self.is_ip()),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Bounded per-evaluator LRU from string to parsed URI, with a one-slot hot
/// key short-circuit (§4.6). Not shared across evaluators.
pub struct UriCache {
    hot_key: Option<String>,
    hot_value: Option<Uri>,
    lru: LruCache<String, Uri>,
}

impl UriCache {
    pub const DEFAULT_CAPACITY: usize = 32;

    pub fn new(capacity: usize) -> UriCache {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        UriCache {
            hot_key: None,
            hot_value: None,
            lru: LruCache::new(capacity),
        }
    }

    /// Parse (or fetch from cache) the URI for `key`. Parse failures are
    /// never cached in the hot slot, and the hot slot is only installed on
    /// success (§4.6).
    pub fn get_or_parse(&mut self, key: &str) -> Option<Uri> {
        if self.hot_key.as_deref() == Some(key) {
            return self.hot_value.clone();
        }
        if let Some(uri) = self.lru.get(key) {
            let uri = uri.clone();
            self.hot_key = Some(key.to_string());
            self.hot_value = Some(uri.clone());
            return Some(uri);
        }
        let uri = Uri::parse(key)?;
        self.lru.put(key.to_string(), uri.clone());
        self.hot_key = Some(key.to_string());
        self.hot_value = Some(uri.clone());
        Some(uri)
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }
}

impl Default for UriCache {
    fn default() -> Self {
        UriCache::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_authority_path() {
        let u = Uri::parse("https://example.com/a/b?x=1").unwrap();
        assert_eq!(u.scheme(), "https");
        assert_eq!(u.authority(), "example.com");
        assert_eq!(u.path(), "/a/b?x=1");
    }

    #[test]
    fn malformed_returns_none() {
        assert!(Uri::parse("not a url").is_none());
        assert!(Uri::parse("://missing-scheme").is_none());
    }

    #[test]
    fn normalized_path_variants() {
        assert_eq!(Uri::parse("https://h").unwrap().normalized_path(), "/");
        assert_eq!(Uri::parse("https://h/a").unwrap().normalized_path(), "/a/");
        assert_eq!(Uri::parse("https://h/a/").unwrap().normalized_path(), "/a/");
    }

    #[test]
    fn is_ip_detection() {
        assert!(Uri::parse("https://127.0.0.1").unwrap().is_ip());
        assert!(Uri::parse("https://[::1]:8080").unwrap().is_ip());
        assert!(!Uri::parse("https://example.com").unwrap().is_ip());
    }

    #[test]
    fn lru_bound_and_hot_key() {
        let mut cache = UriCache::new(2);
        cache.get_or_parse("https://a");
        cache.get_or_parse("https://b");
        cache.get_or_parse("https://c");
        assert!(cache.len() <= 2);
        assert!(cache.get_or_parse("https://not a url").is_none());
    }
}
