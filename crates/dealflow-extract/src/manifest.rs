//! Dataroom manifest decoding
//!
//! A dataroom page carries a JSON payload whose `viewer_html` field holds
//! HTML-escaped markup. Decoding is two stages behind [`decode_manifest`]:
//! find and parse the JSON, then unescape `viewer_html` and parse it as
//! markup to collect the sub-document anchors.

use crate::{error::Result, ExtractError};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());
static BUNDLE_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("div.bundle-viewer a[href]").unwrap());
static BUNDLE_NAME: Lazy<Selector> = Lazy::new(|| Selector::parse(".bundle-document_name").unwrap());

const VIEWER_HTML_KEY: &str = "viewer_html";
const UNKNOWN_DOCUMENT: &str = "unknown_document";

/// One sub-document of a dataroom (or the single document of a plain link)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub url: String,
    pub name: String,
}

/// Decode the ordered sub-document list of a dataroom page
pub fn decode_manifest(body: &str, page_url: &Url) -> Result<Vec<DocumentRef>> {
    let viewer_html = find_viewer_html(body)
        .ok_or_else(|| ExtractError::Manifest(format!("no {} payload in {}", VIEWER_HTML_KEY, page_url)))?;
    let markup = unescape_markup(&viewer_html);
    collect_documents(&markup, page_url)
}

fn find_viewer_html(body: &str) -> Option<String> {
    let mut candidates = vec![body.trim().to_string()];

    let page = Html::parse_document(body);
    candidates.push(page.root_element().text().collect::<String>().trim().to_string());
    candidates.extend(
        page.select(&SCRIPT)
            .map(|script| script.text().collect::<String>().trim().to_string()),
    );

    candidates
        .iter()
        .filter(|c| c.starts_with('{'))
        .find_map(|c| {
            let value: serde_json::Value = serde_json::from_str(c).ok()?;
            value.get(VIEWER_HTML_KEY)?.as_str().map(str::to_string)
        })
}

/// Entity-escaped markup comes back through an HTML text parse; raw markup
/// passes through untouched.
fn unescape_markup(raw: &str) -> String {
    if raw.contains("&lt;") {
        Html::parse_fragment(raw).root_element().text().collect()
    } else {
        raw.to_string()
    }
}

fn collect_documents(markup: &str, page_url: &Url) -> Result<Vec<DocumentRef>> {
    let fragment = Html::parse_fragment(markup);
    let mut documents = Vec::new();

    for anchor in fragment.select(&BUNDLE_LINK) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let url = match page_url.join(href.trim()) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping manifest entry with bad href {:?}: {}", href, e);
                continue;
            }
        };
        documents.push(DocumentRef {
            url: url.to_string(),
            name: document_name(&anchor),
        });
    }

    if documents.is_empty() {
        return Err(ExtractError::Manifest(format!("no documents listed in dataroom {}", page_url)));
    }
    Ok(documents)
}

fn document_name(anchor: &ElementRef) -> String {
    anchor
        .select(&BUNDLE_NAME)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string())
}
