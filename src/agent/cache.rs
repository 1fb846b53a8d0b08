//! A private, per-agent response cache, grounded on
//! `examples/original_source/agent/{cache,cache_store}.go`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

const CACHEABLE_STATUS: &[u16] = &[200, 203, 204, 206, 300, 301, 304, 404, 405, 410, 414, 501];

/// Keyed by the request's absolute URL, same granularity as the original's
/// `map[string]*Cache` keyed on `r.URL.String()`.
pub struct CacheStore {
    table: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    pub(super) fn new() -> Self {
        CacheStore {
            table: RwLock::new(HashMap::new()),
        }
    }

    pub(super) fn get(&self, key: &str) -> Option<CacheEntry> {
        self.table.read().expect("cache poisoned").get(key).cloned()
    }

    pub(super) fn put(&self, key: String, entry: CacheEntry) {
        self.table.write().expect("cache poisoned").insert(key, entry);
    }

    pub fn clear(&self) {
        self.table.write().expect("cache poisoned").clear();
    }
}

pub(super) fn key_for(req: &reqwest::Request) -> String {
    req.url().to_string()
}

#[derive(Default)]
struct CacheControl {
    no_store: bool,
    must_revalidate: bool,
    max_age: Option<i64>,
}

fn parse_cache_control(value: &str) -> CacheControl {
    let mut cc = CacheControl::default();
    for directive in value.split(',') {
        let directive = directive.trim();
        if directive.eq_ignore_ascii_case("no-store") {
            cc.no_store = true;
        } else if directive.eq_ignore_ascii_case("must-revalidate") {
            cc.must_revalidate = true;
        } else if let Some(n) = directive
            .to_ascii_lowercase()
            .strip_prefix("max-age=")
            .and_then(|n| n.parse::<i64>().ok())
        {
            cc.max_age = Some(n);
        }
    }
    cc
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn varies_key(varies: &[String], headers: &HeaderMap) -> String {
    varies
        .iter()
        .map(|name| {
            HeaderName::from_bytes(name.as_bytes())
                .ok()
                .and_then(|n| headers.get(n))
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// A stored response, enough to replay it without revalidation (while fresh)
/// or to send a conditional request when stale.
#[derive(Clone)]
pub(super) struct CacheEntry {
    pub(super) url: Url,
    pub(super) status: u16,
    pub(super) headers: HeaderMap,
    pub(super) body: Bytes,
    stored_at: SystemTime,
    max_age: Option<i64>,
    expires: Option<SystemTime>,
    last_modified: Option<SystemTime>,
    etag: Option<String>,
    must_revalidate: bool,
    varies: Vec<String>,
    varies_key: String,
}

impl CacheEntry {
    /// Builds an entry from a completed response, or `None` if the response
    /// isn't cacheable per `spec.md` §6 (method restriction is enforced by the
    /// caller, which only looks the cache up / stores into it for GET).
    pub(super) fn from_response(
        url: &Url,
        status: u16,
        headers: &HeaderMap,
        req_headers: &HeaderMap,
        body: Bytes,
    ) -> Option<Self> {
        if req_headers.contains_key(http::header::AUTHORIZATION) {
            return None;
        }
        if !CACHEABLE_STATUS.contains(&status) {
            return None;
        }

        let cc = parse_cache_control(header_str(headers, &http::header::CACHE_CONTROL).unwrap_or(""));
        if cc.no_store {
            return None;
        }

        let expires = header_str(headers, &http::header::EXPIRES).and_then(|s| httpdate::parse_http_date(s).ok());
        let last_modified =
            header_str(headers, &http::header::LAST_MODIFIED).and_then(|s| httpdate::parse_http_date(s).ok());
        let etag = header_str(headers, &http::header::ETAG).map(|s| s.to_string());

        if expires.is_none() && last_modified.is_none() && etag.is_none() && cc.max_age.is_none() {
            return None;
        }

        let mut varies: Vec<String> = headers
            .get_all(http::header::VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(',').map(|s| s.trim().to_string()))
            .collect();
        varies.sort();
        let varies_key = varies_key(&varies, req_headers);

        Some(CacheEntry {
            url: url.clone(),
            status,
            headers: headers.clone(),
            body,
            stored_at: SystemTime::now(),
            max_age: cc.max_age,
            expires,
            last_modified,
            etag,
            must_revalidate: cc.must_revalidate,
            varies,
            varies_key,
        })
    }

    fn is_outdated(&self) -> bool {
        let now = SystemTime::now();
        match self.max_age {
            Some(age) if age > 0 => now > self.stored_at + std::time::Duration::from_secs(age as u64),
            _ => match self.expires {
                Some(expires) => now > expires,
                None => true,
            },
        }
    }

    fn matches_varies_key(&self, req_headers: &HeaderMap) -> bool {
        varies_key(&self.varies, req_headers) == self.varies_key
    }

    pub(super) fn requires_revalidate(&self, req_headers: &HeaderMap) -> bool {
        self.must_revalidate || !self.matches_varies_key(req_headers) || self.is_outdated()
    }

    /// Sets `If-Modified-Since`/`If-None-Match` on an outgoing revalidation
    /// request.
    pub(super) fn apply_conditional(&self, req_headers: &mut HeaderMap) {
        if let Some(last_modified) = self.last_modified {
            if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(last_modified)) {
                req_headers.insert(http::header::IF_MODIFIED_SINCE, value);
            }
        }
        if let Some(etag) = &self.etag {
            if let Ok(value) = HeaderValue::from_str(etag) {
                req_headers.insert(http::header::IF_NONE_MATCH, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(HeaderName::from_bytes(k.as_bytes()).unwrap(), HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn no_store_is_never_cached() {
        let url = Url::parse("https://example.com/x").unwrap();
        let res_headers = headers(&[("cache-control", "no-store"), ("etag", "\"a\"")]);
        let entry = CacheEntry::from_response(&url, 200, &res_headers, &HeaderMap::new(), Bytes::new());
        assert!(entry.is_none());
    }

    #[test]
    fn no_freshness_signal_is_not_cached() {
        let url = Url::parse("https://example.com/x").unwrap();
        let entry = CacheEntry::from_response(&url, 200, &HeaderMap::new(), &HeaderMap::new(), Bytes::new());
        assert!(entry.is_none());
    }

    #[test]
    fn max_age_zero_is_immediately_outdated() {
        let url = Url::parse("https://example.com/x").unwrap();
        let res_headers = headers(&[("cache-control", "max-age=0"), ("etag", "\"a\"")]);
        let entry = CacheEntry::from_response(&url, 200, &res_headers, &HeaderMap::new(), Bytes::new()).unwrap();
        assert!(entry.is_outdated());
    }

    #[test]
    fn fresh_entry_with_positive_max_age_is_not_outdated() {
        let url = Url::parse("https://example.com/x").unwrap();
        let res_headers = headers(&[("cache-control", "max-age=60")]);
        let entry = CacheEntry::from_response(&url, 200, &res_headers, &HeaderMap::new(), Bytes::new()).unwrap();
        assert!(!entry.is_outdated());
    }

    #[test]
    fn mismatched_vary_forces_revalidate() {
        let url = Url::parse("https://example.com/x").unwrap();
        let res_headers = headers(&[("cache-control", "max-age=60"), ("vary", "accept-language")]);
        let req_headers = headers(&[("accept-language", "en")]);
        let entry = CacheEntry::from_response(&url, 200, &res_headers, &req_headers, Bytes::new()).unwrap();

        assert!(!entry.requires_revalidate(&req_headers));
        let other_req = headers(&[("accept-language", "fr")]);
        assert!(entry.requires_revalidate(&other_req));
    }

    #[test]
    fn authorization_on_request_prevents_caching() {
        let url = Url::parse("https://example.com/x").unwrap();
        let res_headers = headers(&[("cache-control", "max-age=60")]);
        let req_headers = headers(&[("authorization", "Bearer x")]);
        let entry = CacheEntry::from_response(&url, 200, &res_headers, &req_headers, Bytes::new());
        assert!(entry.is_none());
    }
}
