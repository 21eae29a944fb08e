//! Client for the docsend2pdf rendering proxy
//!
//! The proxy is a Django form: a landing page hands out a `csrftoken`
//! cookie and a matching `csrfmiddlewaretoken` field, and the rendering
//! POST must present both. The pair is bound to one proxy session, so every
//! render fetches its own and nothing is cached.

use crate::config::ExtractorConfig;
use crate::retry::with_backoff;
use crate::{error::Result, ExtractError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{self, HeaderMap};
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::debug;
use url::Url;

static MIDDLEWARE_TOKEN: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[name="csrfmiddlewaretoken"]"#).unwrap());

const CSRF_COOKIE: &str = "csrftoken";

/// A rendered document as returned by the proxy
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub content_disposition: String,
}

impl RenderedPdf {
    /// Whether the payload carries the PDF magic bytes
    pub fn looks_like_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
    }
}

/// Single-use CSRF credential pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfCredentials {
    pub cookie_token: String,
    pub form_token: String,
}

/// Turns a gated document URL into PDF bytes
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, document_url: &str) -> Result<RenderedPdf>;
}

/// docsend2pdf client
pub struct Docsend2PdfClient {
    config: Arc<ExtractorConfig>,
    endpoint: Url,
}

impl Docsend2PdfClient {
    pub fn new(config: Arc<ExtractorConfig>) -> Result<Self> {
        let endpoint = Url::parse(&config.render_proxy_url)?;
        Ok(Self { config, endpoint })
    }

    fn client(&self, timeout_secs: u64) -> Result<Client> {
        Client::builder()
            .user_agent(&self.config.user_agent)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractError::Network(format!("failed to build proxy client: {}", e)))
    }

    /// Fetch a fresh credential pair from the landing page
    pub async fn fetch_credentials(&self) -> Result<CsrfCredentials> {
        let client = self.client(self.config.timeout_secs)?;
        let timeout_secs = self.config.timeout_secs;
        let endpoint = &self.endpoint;
        let client = &client;

        with_backoff(&self.config.retry, "render proxy credentials", || async move {
            let response = client
                .get(endpoint.clone())
                .send()
                .await
                .map_err(|e| ExtractError::from_transport(e, timeout_secs))?;
            let status = response.status();
            if !status.is_success() {
                return Err(ExtractError::Http {
                    status: status.as_u16(),
                    message: format!("render proxy landing page returned {}", status),
                });
            }
            let cookie_token = csrf_cookie(response.headers());
            let body = response
                .text()
                .await
                .map_err(|e| ExtractError::from_transport(e, timeout_secs))?;
            parse_credentials(cookie_token, &body)
        })
        .await
    }
}

#[async_trait]
impl PdfRenderer for Docsend2PdfClient {
    async fn render(&self, document_url: &str) -> Result<RenderedPdf> {
        let credentials = self.fetch_credentials().await?;
        debug!("Submitting {} to render proxy", document_url);

        let mut form = vec![
            ("csrfmiddlewaretoken", credentials.form_token.as_str()),
            ("url", document_url),
            ("email", self.config.email.as_str()),
            ("passcode", self.config.passcode.as_str()),
        ];
        // An unchecked checkbox is an absent field; any value reads as checked
        if self.config.searchable {
            form.push(("searchable", "on"));
        }

        let timeout_secs = self.config.render_timeout_secs;
        let referer = self.endpoint.as_str();
        let response = self
            .client(timeout_secs)?
            .post(self.endpoint.clone())
            .header(header::COOKIE, format!("{}={}", CSRF_COOKIE, credentials.cookie_token))
            .header(header::REFERER, referer)
            .form(&form)
            .send()
            .await
            .map_err(|e| ExtractError::from_transport(e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Http {
                status: status.as_u16(),
                message: format!("render proxy rejected {}", document_url),
            });
        }

        let content_type = header_string(response.headers(), header::CONTENT_TYPE)
            .unwrap_or_else(|| "application/pdf".to_string());
        let content_disposition = header_string(response.headers(), header::CONTENT_DISPOSITION)
            .unwrap_or_else(|| format!("inline; filename=\"{}.pdf\"", document_url));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExtractError::from_transport(e, timeout_secs))?
            .to_vec();

        Ok(RenderedPdf {
            bytes,
            content_type,
            content_disposition,
        })
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn csrf_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            (name == CSRF_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

fn parse_credentials(cookie_token: Option<String>, body: &str) -> Result<CsrfCredentials> {
    let cookie_token =
        cookie_token.ok_or_else(|| ExtractError::MissingCsrfToken("render proxy set no csrftoken cookie".into()))?;
    let page = Html::parse_document(body);
    let form_token = page
        .select(&MIDDLEWARE_TOKEN)
        .find_map(|input| input.value().attr("value"))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ExtractError::MissingCsrfToken("render proxy form has no csrfmiddlewaretoken".into()))?;

    Ok(CsrfCredentials {
        cookie_token,
        form_token,
    })
}
