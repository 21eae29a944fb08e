//! # Dealflow Extract
//!
//! Turns one inbound chat message into a single normalized text corpus plus
//! the PDF artifacts it was built from.
//!
//! ## Features
//!
//! - **Gated documents**: DocSend links are authenticated with the configured
//!   email/passcode; datarooms are expanded into their sub-documents
//! - **Rendering**: each document is rendered to PDF through docsend2pdf
//! - **PDF text**: text layers are read page by page, with an OCR fallback
//!   for scanned pages (`ocr` feature)
//! - **Normalization**: OCR and rendering artifacts are repaired
//! - **Placement**: artifacts are filed per account, duplicates dropped
//!
//! ## Example
//!
//! ```rust,ignore
//! use dealflow_extract::{Aggregator, ArtifactPlacement, ExtractorConfig, InboundMessage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractorConfig::default().with_credentials("ops@fund.vc", "");
//!     let aggregator = Aggregator::new(config)?;
//!
//!     let message = InboundMessage::from_text("Deck: https://docsend.com/view/abc123");
//!     let extraction = aggregator.extract(&message).await?;
//!     println!("{}", extraction.corpus);
//!
//!     ArtifactPlacement::new("/var/lib/dealflow/accounts")
//!         .place_extraction("Acme", extraction)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐     ┌──────────────┐
//! │   Message   │ ──► │ Link probe + │ ──► │  docsend2pdf │ ──► │ PDF text +   │
//! │ text/links  │     │ DocSend auth │     │   (per doc)  │     │ OCR fallback │
//! └─────────────┘     └──────────────┘     └─────────────┘     └──────────────┘
//!        │                                                            │
//!        │            ┌──────────────┐                                ▼
//!        └──────────► │  Attachment  │ ─────────────────────────► Normalizer
//!                     └──────────────┘                                │
//!                                                                     ▼
//!                                                       corpus + artifacts ──► Placement
//! ```

pub mod config;
pub mod docsend;
pub mod error;
pub mod links;
pub mod manifest;
pub mod message;
pub mod normalize;
pub mod orchestrator;
pub mod pdf;
pub mod placement;
pub mod proxy;
pub mod result;
pub mod retry;
pub mod workdir;

pub use config::{ExtractorConfig, OcrConfig, RetryPolicy};
pub use docsend::{DocSendFetcher, DocumentFetcher, Probe, ResolvedLink};
pub use error::{ExtractError, Result};
pub use links::{candidate_links, classify, GatedLink, LinkKind};
pub use manifest::{decode_manifest, DocumentRef};
pub use message::{Attachment, AttachmentSource, EntityKind, InboundMessage, MessageEntity};
pub use normalize::normalize_text;
pub use orchestrator::Aggregator;
pub use pdf::{NoOcr, OcrEngine, PdfTextExtractor};
pub use placement::{ArtifactPlacement, PlacementReport};
pub use proxy::{CsrfCredentials, Docsend2PdfClient, PdfRenderer, RenderedPdf};
pub use result::{Extraction, Fragment, FragmentSource, JobFailure};
pub use workdir::{sanitize_name, WorkDir};

#[cfg(feature = "ocr")]
pub use pdf::TesseractOcr;
