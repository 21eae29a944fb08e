//! Authenticated access to gated DocSend documents
//!
//! A [`DocSendFetcher`] is one session: a cookie jar plus browser-like
//! headers. The orchestrator opens a fresh one for every extraction call,
//! so authentication state never leaks between unrelated messages.

use crate::config::ExtractorConfig;
use crate::links::{classify, LinkKind};
use crate::manifest::{decode_manifest, DocumentRef};
use crate::retry::with_backoff;
use crate::{error::Result, ExtractError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client, StatusCode};
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

static CSRF_META: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"meta[name="csrf-token"]"#).unwrap());
static AUTHENTICITY_INPUT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[name="authenticity_token"]"#).unwrap());

const VERIFICATION_MARKERS: &[&str] = &["verify your email", "email verification", "check your email"];

/// Outcome of a non-redirect-following request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Direct,
    Redirect(Url),
}

/// A gated link after authentication: where it landed and what it holds
#[derive(Debug, Clone)]
pub struct ResolvedLink {
    pub url: Url,
    pub kind: LinkKind,
    pub documents: Vec<DocumentRef>,
}

/// Fetches gated documents within one session
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Request the link without following redirects
    async fn probe(&self, url: &Url) -> Result<Probe>;

    /// Authenticate if challenged and list the documents behind the link
    async fn fetch(&self, url: &Url) -> Result<ResolvedLink>;
}

struct Page {
    url: Url,
    body: String,
}

/// Session against the gated document service
pub struct DocSendFetcher {
    config: Arc<ExtractorConfig>,
    client: Client,
    probe_client: Client,
}

impl DocSendFetcher {
    /// Open a new session
    pub fn new(config: Arc<ExtractorConfig>) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .default_headers(browser_headers())
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()
            .map_err(|e| ExtractError::Network(format!("failed to build HTTP session: {}", e)))?;

        let probe_client = Client::builder()
            .redirect(redirect::Policy::none())
            .default_headers(browser_headers())
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()
            .map_err(|e| ExtractError::Network(format!("failed to build probe client: {}", e)))?;

        Ok(Self {
            config,
            client,
            probe_client,
        })
    }

    async fn get_page(&self, url: &Url) -> Result<Page> {
        let label = format!("GET {}", url);
        with_backoff(&self.config.retry, &label, || async move {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| ExtractError::from_transport(e, self.config.timeout_secs))?;
            read_page(response, self.config.timeout_secs).await
        })
        .await
    }

    async fn authenticate(&self, page: &Page, token: &str) -> Result<Page> {
        debug!("Authenticating against {}", page.url);
        let form = [
            ("utf8", "\u{2713}"),
            ("_method", "patch"),
            ("authenticity_token", token),
            ("link_auth_form[email]", self.config.email.as_str()),
            ("link_auth_form[passcode]", self.config.passcode.as_str()),
            ("commit", "Continue"),
        ];

        let response = self
            .client
            .post(page.url.clone())
            .header(header::REFERER, page.url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| ExtractError::from_transport(e, self.config.timeout_secs))?;

        let authed = read_page(response, self.config.timeout_secs).await?;
        if asks_for_verification(&authed.body) {
            return Err(ExtractError::VerificationRequired {
                url: page.url.to_string(),
            });
        }
        Ok(authed)
    }
}

#[async_trait]
impl DocumentFetcher for DocSendFetcher {
    async fn probe(&self, url: &Url) -> Result<Probe> {
        let response = self
            .probe_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ExtractError::from_transport(e, self.config.timeout_secs))?;

        if !response.status().is_redirection() {
            return Ok(Probe::Direct);
        }
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| url.join(v))
            .transpose()?;

        Ok(location.map(Probe::Redirect).unwrap_or(Probe::Direct))
    }

    async fn fetch(&self, url: &Url) -> Result<ResolvedLink> {
        let mut page = self.get_page(url).await?;

        if let Some(challenge) = auth_challenge(&page.body) {
            let token = challenge.ok_or_else(|| {
                ExtractError::MissingCsrfToken(format!("authentication form at {} carries no token", page.url))
            })?;
            page = self.authenticate(&page, &token).await?;
        }

        let kind = classify(&self.config, &page.url)
            .or_else(|| classify(&self.config, url))
            .unwrap_or(LinkKind::SingleDocument);

        let documents = match kind {
            LinkKind::Dataroom => decode_manifest(&page.body, &page.url)?,
            LinkKind::SingleDocument => vec![DocumentRef {
                url: page.url.to_string(),
                name: last_segment(&page.url),
            }],
        };

        info!("Resolved {} as {:?} with {} document(s)", url, kind, documents.len());
        Ok(ResolvedLink {
            url: page.url,
            kind,
            documents,
        })
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers
}

async fn read_page(response: reqwest::Response, timeout_secs: u64) -> Result<Page> {
    let status = response.status();
    let url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| ExtractError::from_transport(e, timeout_secs))?;

    if status.is_success() {
        return Ok(Page { url, body });
    }
    let gated = status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;
    if gated && asks_for_verification(&body) {
        return Err(ExtractError::VerificationRequired { url: url.to_string() });
    }
    Err(ExtractError::Http {
        status: status.as_u16(),
        message: format!("{} returned {}", url, status.canonical_reason().unwrap_or("error")),
    })
}

/// `None` when the page is not an auth form; `Some(None)` when it is one
/// but no token can be found.
fn auth_challenge(body: &str) -> Option<Option<String>> {
    if !(body.contains("authenticity_token") && body.contains("<input")) {
        return None;
    }
    let page = Html::parse_document(body);
    let token = page
        .select(&CSRF_META)
        .find_map(|meta| meta.value().attr("content"))
        .or_else(|| page.select(&AUTHENTICITY_INPUT).find_map(|input| input.value().attr("value")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    Some(token)
}

fn asks_for_verification(body: &str) -> bool {
    let lower = body.to_lowercase();
    VERIFICATION_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn last_segment(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("document")
        .to_string()
}
