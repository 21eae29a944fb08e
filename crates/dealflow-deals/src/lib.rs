//! # Dealflow Deals
//!
//! Bookkeeping around an extracted corpus: sequential deal ids, the deal
//! record itself, where records are stored, and the reply loop that fills
//! in fields the first pass could not find.
//!
//! ```text
//! corpus ──► FieldExtractor::format_deal ──► DealRecord + DealCounter id
//!                                                 │
//!                                   RecordSink::upsert
//!                                                 │
//!                         missing follow-up fields? ──► PendingFields[key]
//!                                                 │
//! reply(key) ──► FieldExtractor::parse_reply ──► merge ──► upsert ──► re-park
//! ```

pub mod counter;
pub mod error;
pub mod intake;
pub mod pending;
pub mod record;
pub mod sink;

pub use counter::{format_deal_id, DealCounter};
pub use error::{DealError, Result};
pub use intake::{DealIntake, FieldExtractor, IngestOutcome, PendingDeal};
pub use pending::PendingFields;
pub use record::{default_follow_up_fields, DealRecord, FIELDS};
pub use sink::{CsvSink, MemorySink, RecordSink};
