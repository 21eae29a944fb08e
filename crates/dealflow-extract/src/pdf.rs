//! PDF document text extraction
//!
//! The document is parsed once and shared between page workers. Each page's
//! text layer is read on a blocking worker; pages whose layer is empty go
//! through the configured [`OcrEngine`]. At most `max_workers` pages are in
//! flight at a time and the results are reassembled in document order.

use crate::{config::ExtractorConfig, error::Result, ExtractError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Recognises text on a rendered page
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Return the text of one page (1-based) of the PDF at `pdf`
    async fn recognize_page(&self, pdf: &Path, page_number: u32) -> Result<String>;
}

/// OCR disabled: pages without a text layer stay empty
pub struct NoOcr;

#[async_trait]
impl OcrEngine for NoOcr {
    async fn recognize_page(&self, _pdf: &Path, _page_number: u32) -> Result<String> {
        Ok(String::new())
    }
}

/// PDF document text extractor
pub struct PdfTextExtractor {
    max_workers: usize,
    ocr: Arc<dyn OcrEngine>,
}

impl PdfTextExtractor {
    /// Create a new PDF extractor with the given worker bound and OCR engine
    pub fn new(max_workers: usize, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            max_workers: max_workers.max(1),
            ocr,
        }
    }

    /// Build from configuration, using tesseract when OCR is enabled
    pub fn from_config(config: &ExtractorConfig) -> Self {
        #[cfg(feature = "ocr")]
        let ocr: Arc<dyn OcrEngine> = if config.ocr.enabled {
            Arc::new(TesseractOcr::new(config.ocr.clone()))
        } else {
            Arc::new(NoOcr)
        };
        #[cfg(not(feature = "ocr"))]
        let ocr: Arc<dyn OcrEngine> = Arc::new(NoOcr);

        Self::new(config.max_page_workers, ocr)
    }

    /// Extract the text of every page, in page order
    pub async fn extract_file(&self, path: &Path) -> Result<String> {
        let owned: PathBuf = path.to_path_buf();
        let doc = tokio::task::spawn_blocking(move || Document::load(&owned))
            .await
            .map_err(|e| ExtractError::Pdf(format!("loader task failed: {}", e)))??;
        let doc = Arc::new(doc);

        // get_pages is keyed by page number, so this is document order
        let numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        debug!("Extracting {} pages from {}", numbers.len(), path.display());

        let pages: Vec<String> = stream::iter(numbers)
            .map(|number| self.page_text(path, doc.clone(), number))
            .buffered(self.max_workers)
            .collect()
            .await;

        Ok(pages.join("\n"))
    }

    /// Text layer of one page, or OCR when the layer is blank.
    /// Failures degrade to an empty page.
    async fn page_text(&self, path: &Path, doc: Arc<Document>, number: u32) -> String {
        let layer = tokio::task::spawn_blocking(move || text_layer(&doc, number))
            .await
            .unwrap_or_else(|e| TextLayer::Unreadable(format!("page task failed: {}", e)));

        match layer {
            TextLayer::Text(text) => text,
            TextLayer::Blank => {
                debug!("Page {} of {} has no text layer, running OCR", number, path.display());
                match self.ocr.recognize_page(path, number).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("OCR failed on page {} of {}: {}", number, path.display(), e);
                        String::new()
                    }
                }
            }
            TextLayer::Unreadable(reason) => {
                warn!("Unreadable page {} in {}: {}", number, path.display(), reason);
                String::new()
            }
        }
    }
}

enum TextLayer {
    Text(String),
    Blank,
    Unreadable(String),
}

fn text_layer(doc: &Document, number: u32) -> TextLayer {
    match doc.extract_text(&[number]) {
        Ok(text) if !text.trim().is_empty() => TextLayer::Text(text),
        Ok(_) => TextLayer::Blank,
        Err(e) => TextLayer::Unreadable(e.to_string()),
    }
}

#[cfg(feature = "ocr")]
pub use tesseract::TesseractOcr;

#[cfg(feature = "ocr")]
mod tesseract {
    use super::OcrEngine;
    use crate::{config::OcrConfig, error::Result, ExtractError};
    use async_trait::async_trait;
    use std::path::Path;
    use tokio::process::Command;

    /// Rasterizes a page with `pdftoppm` and reads it with `tesseract`
    pub struct TesseractOcr {
        config: OcrConfig,
    }

    impl TesseractOcr {
        pub fn new(config: OcrConfig) -> Self {
            Self { config }
        }
    }

    #[async_trait]
    impl OcrEngine for TesseractOcr {
        async fn recognize_page(&self, pdf: &Path, page_number: u32) -> Result<String> {
            let scratch = tempfile::tempdir()?;
            let prefix = scratch.path().join("page");
            let page = page_number.to_string();
            let dpi = self.config.dpi.to_string();

            let raster = Command::new(&self.config.pdftoppm_bin)
                .args(["-f", page.as_str(), "-l", page.as_str(), "-r", dpi.as_str(), "-png", "-singlefile"])
                .arg(pdf)
                .arg(&prefix)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| ExtractError::Ocr(format!("{} failed to start: {}", self.config.pdftoppm_bin, e)))?;

            if !raster.status.success() {
                return Err(ExtractError::Ocr(format!(
                    "{} exited with {}: {}",
                    self.config.pdftoppm_bin,
                    raster.status,
                    String::from_utf8_lossy(&raster.stderr).trim()
                )));
            }

            let image = prefix.with_extension("png");
            let recognized = Command::new(&self.config.tesseract_bin)
                .arg(&image)
                .arg("stdout")
                .args(["-l", self.config.language.as_str()])
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| ExtractError::Ocr(format!("{} failed to start: {}", self.config.tesseract_bin, e)))?;

            if !recognized.status.success() {
                return Err(ExtractError::Ocr(format!(
                    "{} exited with {}: {}",
                    self.config.tesseract_bin,
                    recognized.status,
                    String::from_utf8_lossy(&recognized.stderr).trim()
                )));
            }

            Ok(String::from_utf8_lossy(&recognized.stdout).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, ObjectId, Stream};
    use std::sync::Mutex;
    use std::time::Duration;

    /// One entry per page; `None` leaves the page without a text layer
    fn build_pdf(pages: &[Option<&str>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids = Vec::new();
        for page in pages {
            let content = match page {
                Some(text) => format!("BT /F1 18 Tf 72 700 Td ({}) Tj ET", text).into_bytes(),
                None => Vec::new(),
            };
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

    fn write_pdf(dir: &Path, pages: &[Option<&str>]) -> PathBuf {
        let path = dir.join("deck.pdf");
        std::fs::write(&path, build_pdf(pages)).unwrap();
        path
    }

    /// Answers "scanned page N" and records which pages it was asked for.
    /// Earlier pages answer later.
    struct SlowOcr {
        page_count: u32,
        calls: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl OcrEngine for SlowOcr {
        async fn recognize_page(&self, _pdf: &Path, page_number: u32) -> Result<String> {
            self.calls.lock().unwrap().push(page_number);
            let delay = (self.page_count + 1 - page_number) as u64 * 25;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!("scanned page {}", page_number))
        }
    }

    #[tokio::test]
    async fn test_text_layer_pages_skip_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), &[Some("Acme raises seed"), None]);
        let ocr = Arc::new(SlowOcr {
            page_count: 2,
            calls: Mutex::new(Vec::new()),
        });

        let extractor = PdfTextExtractor::new(4, ocr.clone());
        let text = extractor.extract_file(&path).await.unwrap();

        assert!(text.contains("Acme raises seed"));
        assert!(text.contains("scanned page 2"));
        assert_eq!(*ocr.calls.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_page_order_survives_out_of_order_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), &[None, None, None, None, None]);
        let ocr = Arc::new(SlowOcr {
            page_count: 5,
            calls: Mutex::new(Vec::new()),
        });

        let extractor = PdfTextExtractor::new(5, ocr);
        let text = extractor.extract_file(&path).await.unwrap();

        let positions: Vec<usize> = (1..=5)
            .map(|n| text.find(&format!("scanned page {}", n)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "pages out of order: {}", text);
    }

    #[tokio::test]
    async fn test_text_layers_read_by_page_workers_stay_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let slides = ["Problem", "Solution", "Market", "Traction", "Team", "Ask"];
        let pages: Vec<Option<&str>> = slides.iter().map(|s| Some(*s)).collect();
        let path = write_pdf(dir.path(), &pages);

        let text = PdfTextExtractor::new(3, Arc::new(NoOcr)).extract_file(&path).await.unwrap();

        let positions: Vec<usize> = slides.iter().map(|s| text.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "pages out of order: {}", text);
    }

    #[tokio::test]
    async fn test_no_ocr_leaves_blank_pages_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), &[None, Some("Team slide")]);

        let extractor = PdfTextExtractor::new(2, Arc::new(NoOcr));
        let text = extractor.extract_file(&path).await.unwrap();

        assert!(text.contains("Team slide"));
        assert!(!text.contains("scanned"));
    }

    #[tokio::test]
    async fn test_garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a.pdf");
        std::fs::write(&path, b"<html>login required</html>").unwrap();

        let extractor = PdfTextExtractor::new(2, Arc::new(NoOcr));
        assert!(matches!(extractor.extract_file(&path).await, Err(ExtractError::Pdf(_))));
    }

    #[cfg(all(feature = "ocr", unix))]
    mod external_tools {
        use super::write_pdf;
        use crate::config::OcrConfig;
        use crate::pdf::{OcrEngine, TesseractOcr};
        use crate::ExtractError;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use std::time::Duration;

        fn script(dir: &Path, name: &str, body: &str) -> String {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn engine(pdftoppm_bin: String, tesseract_bin: String) -> TesseractOcr {
            TesseractOcr::new(OcrConfig {
                enabled: true,
                pdftoppm_bin,
                tesseract_bin,
                ..OcrConfig::default()
            })
        }

        #[tokio::test]
        async fn test_rasterize_then_recognize() {
            let dir = tempfile::tempdir().unwrap();
            // pdftoppm's last argument is the output prefix
            let pdftoppm = script(dir.path(), "pdftoppm", r#"for last; do :; done; : > "$last.png""#);
            let tesseract = script(dir.path(), "tesseract", r#"[ -f "$1" ] && echo "Seed round led by Acme""#);
            let pdf = write_pdf(dir.path(), &[None]);

            let text = engine(pdftoppm, tesseract).recognize_page(&pdf, 1).await.unwrap();
            assert_eq!(text.trim(), "Seed round led by Acme");
        }

        #[tokio::test]
        async fn test_rasterizer_failure_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            let pdftoppm = script(dir.path(), "pdftoppm", "echo 'bad page' >&2; exit 3");
            let tesseract = script(dir.path(), "tesseract", "echo unreachable");
            let pdf = write_pdf(dir.path(), &[None]);

            let err = engine(pdftoppm, tesseract).recognize_page(&pdf, 1).await.unwrap_err();
            assert!(matches!(&err, ExtractError::Ocr(msg) if msg.contains("bad page")), "got {:?}", err);
        }

        #[tokio::test]
        async fn test_cancelled_page_stops_its_tools() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("finished");
            let pdftoppm = script(dir.path(), "pdftoppm", &format!("sleep 2\ntouch '{}'", marker.display()));
            let tesseract = script(dir.path(), "tesseract", "echo unreachable");
            let pdf = write_pdf(dir.path(), &[None]);
            let ocr = engine(pdftoppm, tesseract);

            let outcome = tokio::time::timeout(Duration::from_millis(200), ocr.recognize_page(&pdf, 1)).await;
            assert!(outcome.is_err());

            tokio::time::sleep(Duration::from_millis(2500)).await;
            assert!(!marker.exists(), "rasterizer kept running after its page was dropped");
        }
    }
}
