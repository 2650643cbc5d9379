//! Turns raw contract events into canonical deposit records.
//!
//! An event that does not describe a successful, well-formed deposit is
//! dropped without error. Reading the depositor and amount out of the opaque
//! value payload is delegated to a [`DepositDecoder`], so a real payload
//! decoder can replace the default without touching the checks here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::types::{external_id, CanonicalDeposit};
use crate::rpc::RawEvent;

pub const ACCOUNT_ID_LEN: usize = 56;
pub const ACCOUNT_ID_PREFIX: char = 'G';

/// Account-shape predicate for depositor candidates.
pub fn looks_like_account(candidate: &str) -> bool {
    candidate.len() == ACCOUNT_ID_LEN && candidate.starts_with(ACCOUNT_ID_PREFIX)
}

/// Extracts deposit fields from an event's opaque payload.
pub trait DepositDecoder: Send + Sync {
    /// Depositor address carried in the value payload, if any.
    fn depositor_from_value(&self, value: &str) -> Option<String>;

    /// Deposit amount as a decimal string, if any.
    fn amount(&self, event: &RawEvent) -> Option<String>;
}

/// Decoder for chain-native payloads. Yields nothing until a payload decoder
/// exists, so no event qualifies through it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueValueDecoder;

impl DepositDecoder for OpaqueValueDecoder {
    fn depositor_from_value(&self, _value: &str) -> Option<String> {
        None
    }

    fn amount(&self, _event: &RawEvent) -> Option<String> {
        None
    }
}

/// Reads the value payload as a plain decimal amount. Used with fixture feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainValueDecoder;

impl DepositDecoder for PlainValueDecoder {
    fn depositor_from_value(&self, _value: &str) -> Option<String> {
        None
    }

    fn amount(&self, event: &RawEvent) -> Option<String> {
        let value = event.value.trim();
        (!value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())).then(|| value.to_string())
    }
}

pub struct DepositNormalizer {
    decoder: Arc<dyn DepositDecoder>,
    origin: String,
}

impl DepositNormalizer {
    /// `origin` is recorded in each record's metadata as `source`.
    pub fn new(decoder: Arc<dyn DepositDecoder>, origin: impl Into<String>) -> Self {
        Self {
            decoder,
            origin: origin.into(),
        }
    }

    pub fn normalize(&self, event: &RawEvent) -> Option<CanonicalDeposit> {
        if !event.in_successful_contract_call {
            return None;
        }

        let depositor = self.extract_depositor(event)?;
        let amount_raw = canonical_amount(&self.decoder.amount(event)?)?;

        Some(CanonicalDeposit {
            contract_id: event.contract_id.clone(),
            depositor,
            amount_raw,
            occurred_at: parse_ledger_close(&event.ledger_closed_at),
            external_id: external_id(&event.tx_hash, event.operation_index),
            tx_hash: event.tx_hash.clone(),
            ledger_sequence: i64::from(event.ledger),
            op_index: event.operation_index,
            metadata: self.provenance(event),
        })
    }

    /// First account-shaped topic, else whatever the decoder finds in the
    /// value payload, provided it is account-shaped too.
    fn extract_depositor(&self, event: &RawEvent) -> Option<String> {
        event
            .topic
            .iter()
            .find(|topic| looks_like_account(topic))
            .cloned()
            .or_else(|| self.decoder.depositor_from_value(&event.value))
            .filter(|candidate| looks_like_account(candidate))
    }

    fn provenance(&self, event: &RawEvent) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!(self.origin));
        metadata.insert("event_id".to_string(), json!(event.id));
        metadata.insert("operation_index".to_string(), json!(event.operation_index));
        metadata.insert("transaction_index".to_string(), json!(event.transaction_index));
        metadata.insert("topics".to_string(), json!(event.topic));
        metadata.insert("xdr_value".to_string(), json!(event.value));
        metadata.insert("event_type".to_string(), json!(event.event_type));
        metadata
    }
}

/// Accepts a non-zero unsigned decimal and strips leading zeros. A zero
/// amount means there was no real deposit.
fn canonical_amount(amount: &str) -> Option<String> {
    let amount = amount.trim();
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let significant = amount.trim_start_matches('0');
    (!significant.is_empty()).then(|| significant.to_string())
}

/// Ledger close time, or now when the endpoint sent something unparsable.
fn parse_ledger_close(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::debug!("Unparsable ledger close time '{}', using now", ts);
            Utc::now()
        })
}
