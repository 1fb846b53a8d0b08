//! Request construction: base-URL resolution and default headers, grounded on
//! `examples/original_source/agent/option.go`'s `WithBaseURL`/`WithUserAgent`
//! and the request-building half of `agent.go`.

use bytes::Bytes;
use http::Method;
use url::Url;

use super::AgentError;

pub(super) fn build(
    client: &reqwest::Client,
    base_url: Option<&Url>,
    user_agent: &str,
    method: Method,
    url: &str,
    body: Option<Bytes>,
) -> Result<reqwest::Request, AgentError> {
    let resolved = resolve(base_url, url)?;

    let mut builder = client
        .request(method, resolved)
        .header(http::header::USER_AGENT, user_agent)
        .header(http::header::ACCEPT_ENCODING, "gzip, deflate, br");

    if let Some(body) = body {
        builder = builder.body(body);
    }

    Ok(builder.build()?)
}

/// Resolves `url` against `base_url` the way `net/url`'s `ResolveReference`
/// does: an absolute `url` is returned unchanged, a relative one is joined to
/// `base_url`. Fails with [`AgentError::NoBaseUrl`] if `url` is relative and
/// no base is configured.
pub(super) fn resolve(base_url: Option<&Url>, url: &str) -> Result<Url, AgentError> {
    match Url::parse(url) {
        Ok(absolute) => Ok(absolute),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base_url {
            Some(base) => Ok(base.join(url)?),
            None => Err(AgentError::NoBaseUrl(url.to_string())),
        },
        Err(e) => Err(e.into()),
    }
}
