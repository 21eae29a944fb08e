#![allow(dead_code)]

use async_trait::async_trait;
use dealflow_extract::{
    DocumentFetcher, DocumentRef, ExtractError, ExtractorConfig, LinkKind, PdfRenderer, Probe, RenderedPdf,
    ResolvedLink, Result, RetryPolicy,
};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// A PDF with one text-layer page per entry
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = format!("BT /F1 18 Tf 72 700 Td ({}) Tj ET", text).into_bytes();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Config for tests: scratch temp dir, no OCR, fast retries
pub fn test_config(temp_root: &Path, document_host: &str) -> ExtractorConfig {
    ExtractorConfig::default()
        .with_credentials("ops@fund.vc", "s3cret")
        .with_document_host(document_host)
        .with_temp_dir(temp_root)
        .with_ocr(false)
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        })
}

/// Fetcher answering from fixed tables
#[derive(Default)]
pub struct StubFetcher {
    pub redirects: HashMap<String, String>,
    pub resolved: HashMap<String, Vec<DocumentRef>>,
    pub dataroom: bool,
    pub failing: HashMap<String, fn() -> ExtractError>,
    pub fetched: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn single(url: &str) -> Self {
        let mut fetcher = Self::default();
        fetcher.resolved.insert(
            url.to_string(),
            vec![DocumentRef {
                url: url.to_string(),
                name: "abc123".to_string(),
            }],
        );
        fetcher
    }
}

#[async_trait]
impl DocumentFetcher for StubFetcher {
    async fn probe(&self, url: &Url) -> Result<Probe> {
        match self.redirects.get(url.as_str()) {
            Some(target) => Ok(Probe::Redirect(Url::parse(target)?)),
            None => Ok(Probe::Direct),
        }
    }

    async fn fetch(&self, url: &Url) -> Result<ResolvedLink> {
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(make_error) = self.failing.get(url.as_str()) {
            return Err(make_error());
        }
        let documents = self
            .resolved
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| ExtractError::Http {
                status: 404,
                message: format!("{} not found", url),
            })?;
        Ok(ResolvedLink {
            url: url.clone(),
            kind: if self.dataroom {
                LinkKind::Dataroom
            } else {
                LinkKind::SingleDocument
            },
            documents,
        })
    }
}

/// What the stub renderer does for one document URL
#[derive(Clone)]
pub enum RenderPlan {
    Pdf(Vec<u8>),
    Fail(u16),
    Html,
    Hang,
}

pub struct StubRenderer {
    pub plans: HashMap<String, RenderPlan>,
    pub calls: Mutex<Vec<String>>,
}

impl StubRenderer {
    pub fn new(plans: impl IntoIterator<Item = (String, RenderPlan)>) -> Self {
        Self {
            plans: plans.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PdfRenderer for StubRenderer {
    async fn render(&self, document_url: &str) -> Result<RenderedPdf> {
        self.calls.lock().unwrap().push(document_url.to_string());
        let plan = self
            .plans
            .get(document_url)
            .cloned()
            .unwrap_or(RenderPlan::Fail(404));
        match plan {
            RenderPlan::Pdf(bytes) => Ok(RenderedPdf {
                bytes,
                content_type: "application/pdf".into(),
                content_disposition: "inline; filename=\"deck.pdf\"".into(),
            }),
            RenderPlan::Html => Ok(RenderedPdf {
                bytes: b"<html>Please sign in</html>".to_vec(),
                content_type: "text/html".into(),
                content_disposition: String::new(),
            }),
            RenderPlan::Fail(status) => Err(ExtractError::Http {
                status,
                message: "render failed".into(),
            }),
            RenderPlan::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(ExtractError::Other("should have timed out".into()))
            }
        }
    }
}
