//! HTML resource discovery, grounded on `examples/original_source/agent/html.go`.
//! The original tokenizes incrementally and spawns one goroutine per discovered
//! tag; this collects matches with `scraper` (a DOM tree, not a token stream —
//! the idiomatic Rust choice among the retrieval pack) and fans the fetches out
//! concurrently with `futures::future::join_all`.

use std::collections::HashMap;

use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Agent, AgentError};

/// One discovered and fetched sub-resource.
#[derive(Debug)]
pub struct Resource {
    pub initiator_type: &'static str,
    pub url: Url,
    pub response: Option<super::CachedResponse>,
    pub error: Option<AgentError>,
}

struct Candidate {
    initiator_type: &'static str,
    href: String,
}

/// Discovers `<link rel=stylesheet|icon|shortcut icon|apple-touch-icon|
/// apple-touch-icon-precomposed|manifest>`, `<script src>`, and `<img src>`
/// (skipping `loading="lazy"`) in `body`, resolves each against the effective
/// `<base href>` (only the first one found is honored), fetches them all
/// concurrently, and — if no icon link was seen — fetches `/favicon.ico` as a
/// final step. Keyed by resolved absolute URL, same as the original.
pub(super) async fn discover_and_fetch(
    agent: &Agent,
    ctx: CancellationToken,
    mut base: Url,
    body: &[u8],
) -> HashMap<String, Resource> {
    let document = Html::parse_document(&String::from_utf8_lossy(body));

    if let Some(href) = first_base_href(&document) {
        if let Ok(resolved) = base.join(&href) {
            base = resolved;
        }
    }

    let mut candidates = Vec::new();
    let mut saw_icon = false;

    let link_selector = Selector::parse("link").unwrap();
    for el in document.select(&link_selector) {
        let rel = el.value().attr("rel").unwrap_or("");
        let href = el.value().attr("href").unwrap_or("");
        if href.is_empty() {
            continue;
        }
        let initiator_type = match rel {
            "stylesheet" => "stylesheet",
            "icon" | "shortcut icon" => {
                saw_icon = true;
                "favicon"
            }
            "apple-touch-icon" | "apple-touch-icon-precomposed" => "apple-touch-icon",
            "manifest" => "manifest",
            _ => continue,
        };
        candidates.push(Candidate {
            initiator_type,
            href: href.to_string(),
        });
    }

    let script_selector = Selector::parse("script[src]").unwrap();
    for el in document.select(&script_selector) {
        if let Some(src) = el.value().attr("src") {
            if !src.is_empty() {
                candidates.push(Candidate {
                    initiator_type: "script",
                    href: src.to_string(),
                });
            }
        }
    }

    let img_selector = Selector::parse("img[src]").unwrap();
    for el in document.select(&img_selector) {
        let lazy = el.value().attr("loading") == Some("lazy");
        if lazy {
            continue;
        }
        if let Some(src) = el.value().attr("src") {
            if !src.is_empty() {
                candidates.push(Candidate {
                    initiator_type: "img",
                    href: src.to_string(),
                });
            }
        }
    }

    if !saw_icon {
        candidates.push(Candidate {
            initiator_type: "favicon",
            href: "/favicon.ico".to_string(),
        });
    }

    let fetches = candidates.into_iter().map(|c| {
        let ctx = ctx.clone();
        let base = base.clone();
        async move { fetch_one(agent, ctx, &base, c).await }
    });

    futures::future::join_all(fetches)
        .await
        .into_iter()
        .map(|res| (res.url.to_string(), res))
        .collect()
}

fn first_base_href(document: &Html) -> Option<String> {
    let selector = Selector::parse("base").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string)
}

async fn fetch_one(agent: &Agent, ctx: CancellationToken, base: &Url, candidate: Candidate) -> Resource {
    let resolved = match base.join(&candidate.href) {
        Ok(u) => u,
        Err(e) => {
            return Resource {
                initiator_type: candidate.initiator_type,
                url: base.clone(),
                response: None,
                error: Some(AgentError::InvalidUrl(e)),
            }
        }
    };

    let req = match agent.new_request(http::Method::GET, resolved.as_str(), None) {
        Ok(req) => req,
        Err(e) => {
            return Resource {
                initiator_type: candidate.initiator_type,
                url: resolved,
                response: None,
                error: Some(e),
            }
        }
    };

    match agent.do_request(ctx, req).await {
        Ok(res) => Resource {
            initiator_type: candidate.initiator_type,
            url: resolved,
            response: Some(res),
            error: None,
        },
        Err(e) => Resource {
            initiator_type: candidate.initiator_type,
            url: resolved,
            response: None,
            error: Some(e),
        },
    }
}
