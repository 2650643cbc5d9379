use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A funder deposit as persisted, keyed by `(contract_id, external_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDeposit {
    #[serde(rename = "contractId")]
    pub contract_id: String,
    pub depositor: String,
    /// Non-zero integer amount with no implied scale, kept as text.
    pub amount_raw: String,
    pub occurred_at: DateTime<Utc>,
    /// `txHash#opIndex`
    pub external_id: String,
    pub tx_hash: String,
    pub ledger_sequence: i64,
    pub op_index: i32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Builds the idempotency key for an event.
pub fn external_id(tx_hash: &str, op_index: i32) -> String {
    format!("{}#{}", tx_hash, op_index)
}

/// What an upsert did to the stored row. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
        }
    }
}
