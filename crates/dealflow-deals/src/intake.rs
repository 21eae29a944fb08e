//! Turning an extracted corpus into a stored deal, and completing it from replies

use crate::counter::DealCounter;
use crate::error::{DealError, Result};
use crate::pending::PendingFields;
use crate::record::{default_follow_up_fields, DealRecord, DEAL_ID, FILENAME, SOURCE};
use crate::sink::RecordSink;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Structured-field extraction, typically backed by a language model.
///
/// Both calls return a field-name to value map; unknown names are kept
/// on the record, empty values are ignored.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Pull deal fields out of a full corpus
    async fn format_deal(&self, text: &str) -> Result<HashMap<String, String>>;

    /// Pull values for `missing` out of a free-text reply
    async fn parse_reply(&self, reply: &str, missing: &[String]) -> Result<HashMap<String, String>>;
}

/// A deal waiting on a reply
#[derive(Debug, Clone)]
pub struct PendingDeal {
    pub record: DealRecord,
    pub missing: Vec<String>,
}

/// Record as stored, plus whatever follow-up fields are still empty
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub record: DealRecord,
    pub missing: Vec<String>,
}

impl IngestOutcome {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub struct DealIntake {
    extractor: Arc<dyn FieldExtractor>,
    sink: Arc<dyn RecordSink>,
    counter: DealCounter,
    pending: Mutex<PendingFields<PendingDeal>>,
    follow_up_fields: Vec<String>,
}

impl DealIntake {
    pub fn new(
        extractor: Arc<dyn FieldExtractor>,
        sink: Arc<dyn RecordSink>,
        counter: DealCounter,
        pending_capacity: usize,
    ) -> Self {
        Self {
            extractor,
            sink,
            counter,
            pending: Mutex::new(PendingFields::new(pending_capacity)),
            follow_up_fields: default_follow_up_fields(),
        }
    }

    pub fn with_follow_up_fields(mut self, fields: Vec<String>) -> Self {
        self.follow_up_fields = fields;
        self
    }

    pub fn counter(&self) -> &DealCounter {
        &self.counter
    }

    /// Number of deals waiting on a reply
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().await.contains(key)
    }

    /// Extract fields from `corpus`, assign a deal id and store the record.
    ///
    /// An id is only issued once extraction succeeds. When follow-up
    /// fields are still empty the deal is parked under `key`, the id of
    /// the outbound message asking for them.
    pub async fn ingest(
        &self,
        key: &str,
        corpus: &str,
        artifact_names: &[String],
        source: Option<&str>,
    ) -> Result<IngestOutcome> {
        let fields = self.extractor.format_deal(corpus).await?;
        let mut record = DealRecord::from_fields(fields);

        record.set(DEAL_ID, self.counter.next_id().await?);
        if !artifact_names.is_empty() {
            record.set(FILENAME, artifact_names.join(", "));
        }
        if let Some(source) = source.filter(|s| !s.trim().is_empty()) {
            record.set(SOURCE, source);
        }

        self.sink.upsert(&record).await?;
        info!("Stored {}", record.deal_id().unwrap_or("deal"));

        let missing = record.missing(&self.follow_up_fields);
        self.park(key, &record, &missing).await;
        Ok(IngestOutcome { record, missing })
    }

    /// Fill a parked deal from a reply to the message stored under `key`.
    ///
    /// Fields still empty afterwards are parked again under `next_key`
    /// (or `key` when there is no new outbound message). If the extractor
    /// or the store fails the deal stays parked under `key`.
    pub async fn complete(&self, key: &str, reply: &str, next_key: Option<&str>) -> Result<IngestOutcome> {
        let pending = self
            .pending
            .lock()
            .await
            .take(key)
            .ok_or_else(|| DealError::NotPending(key.to_string()))?;

        let update = match self.extractor.parse_reply(reply, &pending.missing).await {
            Ok(update) => update,
            Err(e) => {
                self.restore(key, pending).await;
                return Err(e);
            }
        };

        let mut record = pending.record.clone();
        let changed = record.merge_non_empty(&update);
        debug!("Reply to {} changed {} field(s)", key, changed);

        if let Err(e) = self.sink.upsert(&record).await {
            self.restore(key, pending).await;
            return Err(e);
        }

        let missing = record.missing(&pending.missing);
        self.park(next_key.unwrap_or(key), &record, &missing).await;
        Ok(IngestOutcome { record, missing })
    }

    async fn park(&self, key: &str, record: &DealRecord, missing: &[String]) {
        if missing.is_empty() {
            return;
        }
        let deal = PendingDeal {
            record: record.clone(),
            missing: missing.to_vec(),
        };
        self.restore(key, deal).await;
    }

    async fn restore(&self, key: &str, deal: PendingDeal) {
        self.pending.lock().await.insert(key, deal);
    }
}
