//! Durable storage for canonical deposits.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_postgres::Row;

use super::types::{CanonicalDeposit, UpsertOutcome};
use crate::db::{DbError, DbOperation, DbPool, DbValue};

pub const DEPOSITS_TABLE: &str = "escrow_funder_deposits";
pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 500;

/// Zero means "unspecified"; anything above the ceiling is capped.
pub fn clamp_limit(limit: usize) -> usize {
    match limit {
        0 => DEFAULT_LIST_LIMIT,
        n => n.min(MAX_LIST_LIMIT),
    }
}

#[async_trait]
pub trait DepositStore: Send + Sync {
    /// Inserts the deposit, or overwrites every non-key field of the record
    /// already stored under its `(contract_id, external_id)`.
    async fn upsert(&self, deposit: &CanonicalDeposit) -> Result<UpsertOutcome, DbError>;

    /// Most recent deposits for a contract, newest first.
    async fn list_by_contract(
        &self,
        contract_id: &str,
        limit: usize,
    ) -> Result<Vec<CanonicalDeposit>, DbError>;
}

pub struct PgDepositStore {
    pool: Arc<DbPool>,
}

impl PgDepositStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

fn upsert_operation(deposit: &CanonicalDeposit) -> DbOperation {
    let columns = [
        "contract_id",
        "external_id",
        "depositor",
        "amount_raw",
        "occurred_at",
        "tx_hash",
        "ledger_sequence",
        "op_index",
        "metadata",
        "updated_at",
    ];
    let values = vec![
        DbValue::text(&deposit.contract_id),
        DbValue::text(&deposit.external_id),
        DbValue::text(&deposit.depositor),
        DbValue::Numeric(deposit.amount_raw.clone()),
        DbValue::TimestampTz(deposit.occurred_at),
        DbValue::text(&deposit.tx_hash),
        DbValue::Int64(deposit.ledger_sequence),
        DbValue::Int32(deposit.op_index),
        DbValue::JsonB(Value::Object(deposit.metadata.clone())),
        DbValue::TimestampTz(chrono::Utc::now()),
    ];

    DbOperation::Upsert {
        table: DEPOSITS_TABLE.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        values,
        conflict_columns: vec!["contract_id".to_string(), "external_id".to_string()],
        update_columns: columns[2..].iter().map(|c| c.to_string()).collect(),
        returning: Some("(xmax = 0) AS inserted".to_string()),
    }
}

fn deposit_from_row(row: &Row) -> Result<CanonicalDeposit, DbError> {
    let metadata = match row.try_get::<_, Value>("metadata")? {
        Value::Object(map) => map,
        other => {
            tracing::warn!("Ignoring non-object deposit metadata: {}", other);
            Map::new()
        }
    };

    Ok(CanonicalDeposit {
        contract_id: row.try_get("contract_id")?,
        depositor: row.try_get("depositor")?,
        amount_raw: row.try_get("amount_raw")?,
        occurred_at: row.try_get("occurred_at")?,
        external_id: row.try_get("external_id")?,
        tx_hash: row.try_get("tx_hash")?,
        ledger_sequence: row.try_get("ledger_sequence")?,
        op_index: row.try_get("op_index")?,
        metadata,
    })
}

#[async_trait]
impl DepositStore for PgDepositStore {
    async fn upsert(&self, deposit: &CanonicalDeposit) -> Result<UpsertOutcome, DbError> {
        let rows = self.pool.execute(upsert_operation(deposit)).await?;
        let row = rows.first().ok_or_else(|| {
            DbError::UnexpectedResult(format!(
                "upsert of {} returned no row",
                deposit.external_id
            ))
        })?;

        let inserted: bool = row.try_get("inserted")?;
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn list_by_contract(
        &self,
        contract_id: &str,
        limit: usize,
    ) -> Result<Vec<CanonicalDeposit>, DbError> {
        let limit = clamp_limit(limit) as i64;
        let sql = format!(
            "SELECT contract_id, depositor, amount_raw::text AS amount_raw, occurred_at, \
             external_id, tx_hash, ledger_sequence, op_index, metadata \
             FROM {} WHERE contract_id = $1 \
             ORDER BY occurred_at DESC, id DESC LIMIT $2",
            DEPOSITS_TABLE
        );

        let rows = self.pool.query(&sql, &[&contract_id, &limit]).await?;
        rows.iter().map(deposit_from_row).collect()
    }
}
