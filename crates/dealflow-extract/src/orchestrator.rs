//! Concurrent aggregation of one message into a text corpus
//!
//! Every link and every document behind it is an independent job on a
//! [`JoinSet`]. The batch waits for all of them and inspects each outcome,
//! so a failing or timed-out job only drops its own contribution. The
//! attachment job runs alongside the link batch.

use crate::config::ExtractorConfig;
use crate::docsend::{DocSendFetcher, DocumentFetcher, Probe};
use crate::links::{candidate_links, parse_gated, redirect_allowed, GatedLink};
use crate::manifest::DocumentRef;
use crate::message::{Attachment, AttachmentSource, InboundMessage};
use crate::normalize::normalize_text;
use crate::pdf::PdfTextExtractor;
use crate::proxy::{Docsend2PdfClient, PdfRenderer};
use crate::result::{Extraction, Fragment, FragmentSource, JobFailure};
use crate::retry::with_backoff;
use crate::workdir::WorkDir;
use crate::{error::Result, ExtractError};
use futures::future::join_all;
use reqwest::Client;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Opens a fresh document session for each extraction call
type FetcherFactory = Arc<dyn Fn(Arc<ExtractorConfig>) -> Result<Arc<dyn DocumentFetcher>> + Send + Sync>;

type JobOutcome = (String, Result<Fragment>);

/// Turns inbound messages into an [`Extraction`]
#[derive(Clone)]
pub struct Aggregator {
    config: Arc<ExtractorConfig>,
    fetchers: FetcherFactory,
    renderer: Arc<dyn PdfRenderer>,
    pdf: Arc<PdfTextExtractor>,
    http: Client,
}

impl Aggregator {
    /// Aggregator backed by DocSend, docsend2pdf and the configured OCR
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let config = Arc::new(config);
        let renderer = Arc::new(Docsend2PdfClient::new(config.clone())?);
        let pdf = Arc::new(PdfTextExtractor::from_config(&config));
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()
            .map_err(|e| ExtractError::Network(format!("failed to build download client: {}", e)))?;
        let fetchers: FetcherFactory = Arc::new(|config: Arc<ExtractorConfig>| -> Result<Arc<dyn DocumentFetcher>> {
            Ok(Arc::new(DocSendFetcher::new(config)?))
        });

        Ok(Self {
            config,
            fetchers,
            renderer,
            pdf,
            http,
        })
    }

    /// Use one fetcher for every call
    pub fn with_fetcher(mut self, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        self.fetchers = Arc::new(move |_: Arc<ExtractorConfig>| -> Result<Arc<dyn DocumentFetcher>> { Ok(fetcher.clone()) });
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PdfRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_pdf_extractor(mut self, pdf: PdfTextExtractor) -> Self {
        self.pdf = Arc::new(pdf);
        self
    }

    /// Aggregate a single link as if it were the whole message
    pub async fn extract_link(&self, url: &str) -> Result<Extraction> {
        self.extract(&InboundMessage::from_text(url)).await
    }

    /// Aggregate message text, gated links and a PDF attachment
    pub async fn extract(&self, message: &InboundMessage) -> Result<Extraction> {
        let work_dir = Arc::new(WorkDir::create(&self.config.temp_dir).await?);
        let fetcher = (self.fetchers)(self.config.clone())?;

        let candidates = candidate_links(message);

        let ((links, mut outcomes), attachment) = tokio::join!(
            self.process_links(fetcher, &candidates, work_dir.clone()),
            self.run_attachment(message.document.clone(), work_dir.clone()),
        );
        outcomes.extend(attachment);

        let mut fragments = Vec::new();
        let mut failures = Vec::new();
        for (job, outcome) in outcomes {
            match outcome {
                Ok(fragment) => fragments.push(fragment),
                Err(e) => failures.push(record_failure(job, &e)),
            }
        }

        let corpus = combine(message, &fragments);
        if corpus.is_empty() {
            return Err(empty_result_error(&failures));
        }

        info!(
            "Aggregated {} chars from {} fragment(s), {} failed job(s)",
            corpus.len(),
            fragments.len(),
            failures.len()
        );
        Ok(Extraction {
            corpus,
            fragments,
            failures,
            links: links.into_iter().map(|l| l.url.to_string()).collect(),
            work_dir,
        })
    }

    /// Validate candidates, then run a job per surviving link
    async fn process_links(
        &self,
        fetcher: Arc<dyn DocumentFetcher>,
        candidates: &[String],
        work_dir: Arc<WorkDir>,
    ) -> (Vec<GatedLink>, Vec<JobOutcome>) {
        let links = self.validate_links(fetcher.as_ref(), candidates).await;
        debug!("{} gated link(s) to process", links.len());
        let outcomes = self.run_links(fetcher, &links, work_dir).await;
        (links, outcomes)
    }

    /// Keep links on the gated host and path whose probe does not bounce
    /// somewhere else
    async fn validate_links(&self, fetcher: &dyn DocumentFetcher, candidates: &[String]) -> Vec<GatedLink> {
        let gated: Vec<GatedLink> = candidates
            .iter()
            .filter_map(|raw| {
                let link = parse_gated(&self.config, raw);
                if link.is_none() {
                    debug!("Ignoring non-document link {}", raw);
                }
                link
            })
            .collect();

        let probes = join_all(gated.iter().map(|link| fetcher.probe(&link.url))).await;

        gated
            .into_iter()
            .zip(probes)
            .filter(|(link, probe)| match probe {
                Ok(Probe::Redirect(target)) if !redirect_allowed(&self.config, target) => {
                    info!("Excluding {}: redirects to {}", link.url, target);
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    debug!("Probe of {} failed ({}), keeping it", link.url, e);
                    true
                }
            })
            .map(|(link, _)| link)
            .collect()
    }

    async fn run_links(
        &self,
        fetcher: Arc<dyn DocumentFetcher>,
        links: &[GatedLink],
        work_dir: Arc<WorkDir>,
    ) -> Vec<JobOutcome> {
        let mut jobs = JoinSet::new();
        for link in links {
            let this = self.clone();
            let fetcher = fetcher.clone();
            let work_dir = work_dir.clone();
            let link = link.clone();
            jobs.spawn(async move { this.run_link(fetcher, link, work_dir).await });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(link_outcomes) => outcomes.extend(link_outcomes),
                Err(e) => outcomes.push(("link job".to_string(), Err(ExtractError::Other(e.to_string())))),
            }
        }
        outcomes
    }

    /// Resolve one link and fan out over its documents
    async fn run_link(&self, fetcher: Arc<dyn DocumentFetcher>, link: GatedLink, work_dir: Arc<WorkDir>) -> Vec<JobOutcome> {
        let label = link.url.to_string();
        let resolved = match self.bounded(&label, fetcher.fetch(&link.url)).await {
            Ok(resolved) => resolved,
            Err(e) => return vec![(label, Err(e))],
        };

        let mut jobs = JoinSet::new();
        for document in resolved.documents {
            let this = self.clone();
            let work_dir = work_dir.clone();
            let link = label.clone();
            jobs.spawn(async move {
                let job = format!("{} ({})", document.url, document.name);
                let outcome = this.bounded(&job, this.run_document(&link, &document, &work_dir)).await;
                (job, outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push((label.clone(), Err(ExtractError::Other(e.to_string())))),
            }
        }
        outcomes
    }

    /// Render one document, store it and extract its text
    async fn run_document(&self, link: &str, document: &DocumentRef, work_dir: &WorkDir) -> Result<Fragment> {
        let rendered = self.renderer.render(&document.url).await?;
        if !rendered.looks_like_pdf() {
            return Err(ExtractError::Pdf(format!(
                "render proxy returned {} instead of a PDF",
                rendered.content_type
            )));
        }

        let path = work_dir.claim(&document.name).await;
        tokio::fs::write(&path, &rendered.bytes).await?;
        let text = self.document_text(&path).await;

        Ok(Fragment {
            source: FragmentSource::Document {
                link: link.to_string(),
                name: document.name.clone(),
            },
            text,
            artifact: Some(path),
        })
    }

    async fn run_attachment(&self, attachment: Option<Attachment>, work_dir: Arc<WorkDir>) -> Option<JobOutcome> {
        let attachment = attachment?;
        if !attachment.is_pdf() {
            debug!("Skipping non-PDF attachment {}", attachment.file_name);
            return None;
        }
        let job = attachment.file_name.clone();
        let outcome = self.bounded(&job, self.store_attachment(&attachment, &work_dir)).await;
        Some((job, outcome))
    }

    async fn store_attachment(&self, attachment: &Attachment, work_dir: &WorkDir) -> Result<Fragment> {
        let bytes = match &attachment.source {
            AttachmentSource::Bytes(bytes) => bytes.clone(),
            AttachmentSource::Url(url) => self.download(url).await?,
        };
        if bytes.len() > self.config.max_attachment_bytes {
            return Err(ExtractError::ContentTooLarge {
                size: bytes.len(),
                max: self.config.max_attachment_bytes,
            });
        }

        let path = work_dir.claim(&attachment.file_name).await;
        tokio::fs::write(&path, &bytes).await?;
        let text = self.document_text(&path).await;

        Ok(Fragment {
            source: FragmentSource::Attachment {
                file_name: attachment.file_name.clone(),
            },
            text,
            artifact: Some(path),
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let max = self.config.max_attachment_bytes;
        let timeout_secs = self.config.timeout_secs;
        let client = &self.http;
        let label = format!("download {}", url);

        with_backoff(&self.config.retry, &label, || async move {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| ExtractError::from_transport(e, timeout_secs))?;
            let status = response.status();
            if !status.is_success() {
                return Err(ExtractError::Http {
                    status: status.as_u16(),
                    message: format!("attachment download returned {}", status),
                });
            }
            if let Some(size) = response.content_length() {
                if size as usize > max {
                    return Err(ExtractError::ContentTooLarge { size: size as usize, max });
                }
            }

            let mut response = response;
            let mut body = Vec::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| ExtractError::from_transport(e, timeout_secs))?
            {
                if body.len() + chunk.len() > max {
                    return Err(ExtractError::ContentTooLarge {
                        size: body.len() + chunk.len(),
                        max,
                    });
                }
                body.extend_from_slice(&chunk);
            }
            Ok(body)
        })
        .await
    }

    /// Normalized text of a stored PDF; unreadable files count as empty
    async fn document_text(&self, path: &Path) -> String {
        match self.pdf.extract_file(path).await {
            Ok(raw) => normalize_text(&raw),
            Err(e) => {
                warn!("No text from {}: {}", path.display(), e);
                String::new()
            }
        }
    }

    async fn bounded<T>(&self, job: &str, work: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.job_timeout(), work).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("{} hit the job timeout", job);
                Err(ExtractError::Timeout(self.config.job_timeout_secs))
            }
        }
    }
}

fn record_failure(job: String, error: &ExtractError) -> JobFailure {
    warn!("Job {} failed: {}", job, error);
    JobFailure {
        job,
        error: error.to_string(),
        verification_required: error.is_verification_required(),
    }
}

/// Message text, caption, then every non-empty fragment
fn combine(message: &InboundMessage, fragments: &[Fragment]) -> String {
    let own = [message.text.as_deref(), message.caption.as_deref()];
    own.into_iter()
        .flatten()
        .chain(fragments.iter().map(|f| f.text.as_str()))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn empty_result_error(failures: &[JobFailure]) -> ExtractError {
    if let Some(failure) = failures.iter().find(|f| f.verification_required) {
        return ExtractError::VerificationRequired {
            url: failure.job.clone(),
        };
    }
    match failures.first() {
        Some(failure) => ExtractError::NoContent(format!("{} failed: {}", failure.job, failure.error)),
        None => ExtractError::NoContent("message has no text, gated links or PDF attachment".into()),
    }
}
