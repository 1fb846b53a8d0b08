//! A concrete HTTP collaborator: request building, a private RFC 7234-ish
//! cache, transparent content-decoding, and HTML resource discovery.
//!
//! `spec.md` §6 specifies this as an external collaborator contract; this
//! module ships a working implementation of it (`SPEC_FULL.md` §3) so the
//! harness is runnable end-to-end. Grounded on
//! `examples/original_source/agent/{agent,option,pool}.go` for shape and on
//! `cache.go`/`cache_store.go`/`decompress.go`/`html.go` for the sibling
//! modules' algorithms.

mod cache;
mod decode;
mod html;
mod request;

pub use cache::CacheStore;
pub use html::Resource;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Cause, ErrorCode, StructuredError};

/// Errors this module can surface, all classifiable through [`crate::error::codes_of`]
/// when wrapped in a [`StructuredError`] by a caller.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("response stream error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no base URL configured and `{0}` is not absolute")]
    NoBaseUrl(String),
}

/// Construction-time options for [`Agent`], the idiomatic equivalent of the
/// original's `AgentOption` functional options (`WithBaseURL`, `WithUserAgent`,
/// `WithTimeout`, `WithNoCache`, `WithNoCookie`).
#[derive(Clone)]
pub struct AgentOptions {
    base_url: Option<Url>,
    user_agent: String,
    request_timeout: Option<Duration>,
    cache: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        AgentOptions {
            base_url: None,
            user_agent: concat!("loadcraft/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: None,
            cache: true,
        }
    }
}

impl AgentOptions {
    pub fn base_url(mut self, url: &str) -> Result<Self, AgentError> {
        self.base_url = Some(Url::parse(url)?);
        Ok(self)
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.request_timeout = Some(d);
        self
    }

    /// Disables the private response cache entirely, the equivalent of the
    /// original's `WithNoCache`.
    pub fn without_cache(mut self) -> Self {
        self.cache = false;
        self
    }
}

/// A reusable HTTP client scoped to one benchmark run (or shared across many,
/// since every method takes `&self`). Cheap to clone: internals are `Arc`-backed.
#[derive(Clone)]
pub struct Agent {
    client: reqwest::Client,
    base_url: Option<Url>,
    user_agent: String,
    cache: Option<Arc<CacheStore>>,
}

impl Agent {
    /// Builds a new agent with its own `reqwest::Client`. Use
    /// [`Self::with_client`] to supply one already configured with a cookie
    /// jar or custom TLS settings — those concerns are the caller's, per
    /// `spec.md` §6's Non-goals.
    pub fn new(options: AgentOptions) -> Result<Self, AgentError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self::with_client(client, options))
    }

    pub fn with_client(client: reqwest::Client, options: AgentOptions) -> Self {
        Agent {
            client,
            base_url: options.base_url,
            user_agent: options.user_agent,
            cache: options.cache.then(|| Arc::new(CacheStore::new())),
        }
    }

    /// Resolves `url` against the configured base (if any) and builds a
    /// request carrying the default `User-Agent` and `Accept-Encoding`
    /// headers. Returns [`AgentError::NoBaseUrl`] if `url` is relative and no
    /// base was configured.
    pub fn new_request(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<reqwest::Request, AgentError> {
        request::build(&self.client, self.base_url.as_ref(), &self.user_agent, method, url, body)
    }

    /// Executes `req`, transparently serving/storing through the private
    /// cache (when enabled) and decoding `Content-Encoding` before returning.
    #[instrument(skip_all, fields(url = %req.url()))]
    pub async fn do_request(
        &self,
        ctx: CancellationToken,
        mut req: reqwest::Request,
    ) -> Result<CachedResponse, AgentError> {
        let cache_key = cache::key_for(&req);
        let is_get = req.method() == Method::GET;

        let stored = if is_get {
            self.cache.as_ref().and_then(|c| c.get(&cache_key))
        } else {
            None
        };

        if let Some(entry) = &stored {
            if !entry.requires_revalidate(req.headers()) {
                debug!(url = %req.url(), "cache hit, fresh");
                return Ok(CachedResponse {
                    status: entry.status,
                    headers: entry.headers.clone(),
                    body: entry.body.clone(),
                    from_cache: true,
                });
            }
            entry.apply_conditional(req.headers_mut());
        }

        let req_headers_snapshot = req.headers().clone();
        let fut = self.client.execute(req);
        let res = tokio::select! {
            _ = ctx.cancelled() => {
                return Err(AgentError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "request canceled",
                )))
            }
            res = fut => res?,
        };

        if res.status().as_u16() == 304 {
            if let Some(entry) = stored {
                debug!(url = %entry.url, "revalidated, not modified");
                return Ok(CachedResponse {
                    status: entry.status,
                    headers: entry.headers.clone(),
                    body: entry.body.clone(),
                    from_cache: true,
                });
            }
        }

        let status = res.status().as_u16();
        let mut headers = res.headers().clone();
        let url = res.url().clone();
        let body = decode::decode_body(&mut headers, res).await?;

        if is_get {
            if let Some(store) = &self.cache {
                if let Some(entry) =
                    cache::CacheEntry::from_response(&url, status, &headers, &req_headers_snapshot, body.clone())
                {
                    store.put(cache_key, entry);
                }
            }
        }

        Ok(CachedResponse {
            status,
            headers,
            body,
            from_cache: false,
        })
    }

    /// Fetches `url`, discovers embedded resources in the HTML body, and
    /// fetches each of them concurrently. See [`html`] for the discovery
    /// rules.
    pub async fn process_html(
        &self,
        ctx: CancellationToken,
        base: Url,
        body: &[u8],
    ) -> std::collections::HashMap<String, Resource> {
        html::discover_and_fetch(self, ctx, base, body).await
    }

    pub fn clear_cache(&self) {
        if let Some(store) = &self.cache {
            store.clear();
        }
    }
}

/// A response with its body fully decoded and buffered, the return type of
/// [`Agent::do_request`].
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: http::HeaderMap,
    pub body: Bytes,
    pub from_cache: bool,
}

/// Wraps `err` as a [`StructuredError`] with `code`, for callers building a
/// `Cause` to hand to [`crate::step::Step::add_error`].
pub fn classify(code: ErrorCode, err: AgentError) -> Cause {
    Box::new(StructuredError::new(code, Box::new(err) as Cause))
}
