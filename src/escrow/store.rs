use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::types::{EscrowError, EscrowKind, EscrowRecord};
use crate::db::{DbError, DbOperation, DbPool, DbValue, WhereClause};
use crate::deposits::UpsertOutcome;

pub const ESCROWS_TABLE: &str = "escrows";

#[async_trait]
pub trait EscrowStore: Send + Sync {
    async fn upsert(
        &self,
        kind: EscrowKind,
        contract_id: &str,
        document: &Value,
    ) -> Result<UpsertOutcome, EscrowError>;

    async fn get(&self, contract_id: &str) -> Result<Option<EscrowRecord>, EscrowError>;

    /// Returns whether a record existed.
    async fn delete(&self, contract_id: &str) -> Result<bool, EscrowError>;
}

pub struct PgEscrowStore {
    pool: Arc<DbPool>,
}

impl PgEscrowStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

fn upsert_operation(kind: EscrowKind, contract_id: &str, document: &Value) -> DbOperation {
    DbOperation::Upsert {
        table: ESCROWS_TABLE.to_string(),
        columns: ["contract_id", "kind", "document", "updated_at"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        values: vec![
            DbValue::text(contract_id),
            DbValue::text(kind.as_str()),
            DbValue::JsonB(document.clone()),
            DbValue::TimestampTz(chrono::Utc::now()),
        ],
        conflict_columns: vec!["contract_id".to_string()],
        update_columns: ["kind", "document", "updated_at"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        returning: Some("(xmax = 0) AS inserted".to_string()),
    }
}

#[async_trait]
impl EscrowStore for PgEscrowStore {
    async fn upsert(
        &self,
        kind: EscrowKind,
        contract_id: &str,
        document: &Value,
    ) -> Result<UpsertOutcome, EscrowError> {
        if contract_id.is_empty() {
            return Err(EscrowError::MissingContractId);
        }

        let rows = self
            .pool
            .execute(upsert_operation(kind, contract_id, document))
            .await?;
        let row = rows.first().ok_or_else(|| {
            DbError::UnexpectedResult(format!("upsert of escrow {} returned no row", contract_id))
        })?;
        let inserted: bool = row.try_get("inserted").map_err(DbError::from)?;

        tracing::debug!("Stored {} escrow {}", kind.as_str(), contract_id);
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn get(&self, contract_id: &str) -> Result<Option<EscrowRecord>, EscrowError> {
        let sql = format!(
            "SELECT contract_id, kind, document FROM {} WHERE contract_id = $1",
            ESCROWS_TABLE
        );
        let rows = self.pool.query(&sql, &[&contract_id]).await?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let kind: String = row.try_get("kind").map_err(DbError::from)?;
        let kind = EscrowKind::parse(&kind)
            .ok_or_else(|| DbError::UnexpectedResult(format!("unknown escrow kind '{}'", kind)))?;

        Ok(Some(EscrowRecord {
            contract_id: row.try_get("contract_id").map_err(DbError::from)?,
            kind,
            document: row.try_get("document").map_err(DbError::from)?,
        }))
    }

    async fn delete(&self, contract_id: &str) -> Result<bool, EscrowError> {
        let rows = self
            .pool
            .execute(DbOperation::Delete {
                table: ESCROWS_TABLE.to_string(),
                where_clause: WhereClause::Eq("contract_id".to_string(), DbValue::text(contract_id)),
                returning: Some("contract_id".to_string()),
            })
            .await?;
        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryEscrowStore {
        rows: Mutex<HashMap<String, (EscrowKind, Value)>>,
    }

    #[async_trait]
    impl EscrowStore for MemoryEscrowStore {
        async fn upsert(
            &self,
            kind: EscrowKind,
            contract_id: &str,
            document: &Value,
        ) -> Result<UpsertOutcome, EscrowError> {
            if contract_id.is_empty() {
                return Err(EscrowError::MissingContractId);
            }
            let previous = self
                .rows
                .lock()
                .await
                .insert(contract_id.to_string(), (kind, document.clone()));
            Ok(match previous {
                Some(_) => UpsertOutcome::Updated,
                None => UpsertOutcome::Inserted,
            })
        }

        async fn get(&self, contract_id: &str) -> Result<Option<EscrowRecord>, EscrowError> {
            Ok(self
                .rows
                .lock()
                .await
                .get(contract_id)
                .map(|(kind, document)| EscrowRecord {
                    contract_id: contract_id.to_string(),
                    kind: *kind,
                    document: document.clone(),
                }))
        }

        async fn delete(&self, contract_id: &str) -> Result<bool, EscrowError> {
            Ok(self.rows.lock().await.remove(contract_id).is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_upsert_operation_replaces_document_fields() {
        let DbOperation::Upsert {
            table,
            columns,
            values,
            conflict_columns,
            update_columns,
            ..
        } = upsert_operation(EscrowKind::Multi, "CESCROW2", &json!({"title": "t"}))
        else {
            panic!("expected an upsert");
        };

        assert_eq!(table, ESCROWS_TABLE);
        assert_eq!(columns.len(), values.len());
        assert_eq!(conflict_columns, vec!["contract_id"]);
        assert_eq!(update_columns, vec!["kind", "document", "updated_at"]);
        assert!(matches!(&values[1], DbValue::Text(k) if k == "multi"));
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = memory::MemoryEscrowStore::default();
        let doc = json!({"contractId": "CESCROW1", "amount": 10});

        let first = store.upsert(EscrowKind::Single, "CESCROW1", &doc).await.unwrap();
        let second = store.upsert(EscrowKind::Single, "CESCROW1", &doc).await.unwrap();
        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Updated);

        let record = store.get("CESCROW1").await.unwrap().unwrap();
        assert_eq!(record.kind, EscrowKind::Single);
        assert_eq!(record.document["amount"], 10);

        assert!(store.delete("CESCROW1").await.unwrap());
        assert!(!store.delete("CESCROW1").await.unwrap());
        assert!(store.get("CESCROW1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_contract_id_is_rejected() {
        let store = memory::MemoryEscrowStore::default();
        let err = store
            .upsert(EscrowKind::Multi, "", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::MissingContractId));
    }
}
