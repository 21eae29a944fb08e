//! Deal record field map

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const DEAL_ID: &str = "Deal ID";
pub const ACCOUNT_NAME: &str = "Account Name / PortCo";
pub const DEAL_NAME: &str = "Deal Name";
pub const STAGE: &str = "Stage";
pub const ACCOUNT_DESCRIPTION: &str = "Account Description";
pub const WEBSITE: &str = "Website";
pub const DECK: &str = "Deck";
pub const FUNDRAISE_AMOUNT: &str = "Fundraise Amount($USD)";
pub const EQUITY_VALUATION: &str = "Equity Valuation/Cap";
pub const TOKEN_VALUATION: &str = "Token Valuation";
pub const RELATIONSHIP_OWNER: &str = "CMT Relationship Owner";
pub const SOURCE: &str = "Source";
pub const ROUND: &str = "Round";
pub const FILENAME: &str = "Filename";

/// Column order of the tabular store
pub const FIELDS: [&str; 14] = [
    DEAL_ID,
    ACCOUNT_NAME,
    DEAL_NAME,
    STAGE,
    ACCOUNT_DESCRIPTION,
    WEBSITE,
    DECK,
    FUNDRAISE_AMOUNT,
    EQUITY_VALUATION,
    TOKEN_VALUATION,
    RELATIONSHIP_OWNER,
    SOURCE,
    ROUND,
    FILENAME,
];

/// Fields worth asking the sender about when the first pass leaves them empty
pub fn default_follow_up_fields() -> Vec<String> {
    [ACCOUNT_NAME, ACCOUNT_DESCRIPTION, WEBSITE, FUNDRAISE_AMOUNT, ROUND]
        .iter()
        .map(|f| f.to_string())
        .collect()
}

/// One deal; unknown keys from the extractor are kept alongside the columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealRecord {
    fields: BTreeMap<String, String>,
}

impl DealRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an extractor's field map, trimming values
    pub fn from_fields(fields: HashMap<String, String>) -> Self {
        let mut record = Self::new();
        for (key, value) in fields {
            record.set(key, value);
        }
        record
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into().trim().to_string());
    }

    pub fn deal_id(&self) -> Option<&str> {
        self.get(DEAL_ID).filter(|id| !id.is_empty())
    }

    pub fn account_name(&self) -> Option<&str> {
        self.get(ACCOUNT_NAME).filter(|name| !name.is_empty())
    }

    /// Which of `fields` are absent or empty, in the order given
    pub fn missing(&self, fields: &[String]) -> Vec<String> {
        fields
            .iter()
            .filter(|f| self.get(f).map(str::is_empty).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Copy over every non-empty value; returns how many fields changed
    pub fn merge_non_empty(&mut self, update: &HashMap<String, String>) -> usize {
        let mut changed = 0;
        for (key, value) in update {
            let value = value.trim();
            if value.is_empty() || self.get(key) == Some(value) {
                continue;
            }
            self.set(key.clone(), value);
            changed += 1;
        }
        changed
    }

    /// Values in [`FIELDS`] order, empty where unset
    pub fn columns(&self) -> Vec<&str> {
        FIELDS.iter().map(|f| self.get(f).unwrap_or("")).collect()
    }
}
