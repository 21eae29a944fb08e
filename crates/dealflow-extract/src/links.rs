//! Candidate link discovery and gated-link classification

use crate::config::ExtractorConfig;
use crate::message::{EntityKind, InboundMessage};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).unwrap());

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

/// Kind of gated document behind a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    SingleDocument,
    Dataroom,
}

/// A link that passed the host/path policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedLink {
    pub url: Url,
    pub kind: LinkKind,
}

/// Every URL mentioned by the message: plain text, URL entities and
/// text-link targets, from both body and caption. First occurrence wins;
/// spellings of the same URL that differ only in a trailing slash, host
/// case or fragment count as one.
pub fn candidate_links(message: &InboundMessage) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |raw: &str| {
        let cleaned = raw.trim().trim_end_matches(TRAILING_PUNCTUATION);
        if !cleaned.is_empty() && seen.insert(dedup_key(cleaned)) {
            found.push(cleaned.to_string());
        }
    };

    for (text, entities) in message.text_parts() {
        for m in URL_PATTERN.find_iter(text) {
            push(m.as_str());
        }
        for entity in entities {
            match entity.kind {
                EntityKind::Url => {
                    if let Some(covered) = entity.covered_text(text) {
                        push(covered);
                    }
                }
                EntityKind::TextLink => {
                    if let Some(url) = entity.url.as_deref() {
                        push(url);
                    }
                }
                EntityKind::Other => {}
            }
        }
    }

    found
}

fn dedup_key(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(if path.is_empty() { "/" } else { &path });
    url.set_fragment(None);
    url.to_string()
}

/// Whether `host` is the configured document host or one of its subdomains
pub fn is_document_host(config: &ExtractorConfig, host: &str) -> bool {
    let expected = config.document_host.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    host == expected || host.ends_with(&format!(".{}", expected))
}

/// Classify a URL by path pattern; `None` when it is not a gated document view
pub fn classify(config: &ExtractorConfig, url: &Url) -> Option<LinkKind> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if !is_document_host(config, url.host_str()?) {
        return None;
    }
    let path = url.path();
    if !config.view_path_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
        return None;
    }
    if path.contains(config.dataroom_marker.as_str()) {
        Some(LinkKind::Dataroom)
    } else {
        Some(LinkKind::SingleDocument)
    }
}

/// Parse and classify a raw candidate
pub fn parse_gated(config: &ExtractorConfig, raw: &str) -> Option<GatedLink> {
    let url = Url::parse(raw).ok()?;
    let kind = classify(config, &url)?;
    Some(GatedLink { url, kind })
}

/// A redirect is acceptable only when it stays on the document service;
/// link previews often bounce to an unrelated media host instead.
pub fn redirect_allowed(config: &ExtractorConfig, target: &Url) -> bool {
    target.host_str().map(|host| is_document_host(config, host)).unwrap_or(false)
}
