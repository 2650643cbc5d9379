#[cfg(test)]
pub(crate) mod memory;
mod normalizer;
mod service;
mod source;
mod store;
mod types;

pub use normalizer::{
    looks_like_account, DepositDecoder, DepositNormalizer, OpaqueValueDecoder, PlainValueDecoder,
};
pub use service::{IngestionError, IngestionService, IngestionStats};
pub use source::{EventSource, LedgerWindow, LedgerWindowSource};
pub use store::{clamp_limit, DepositStore, PgDepositStore, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use types::{external_id, CanonicalDeposit, UpsertOutcome};
