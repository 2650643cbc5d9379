use async_trait::async_trait;
use tokio::sync::Mutex;

use super::store::{clamp_limit, DepositStore};
use super::types::{CanonicalDeposit, UpsertOutcome};
use crate::db::DbError;

/// Deposit store kept in process memory, with the same key and ordering
/// rules as the Postgres store.
#[derive(Default)]
pub struct MemoryDepositStore {
    rows: Mutex<Vec<CanonicalDeposit>>,
}

impl MemoryDepositStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl DepositStore for MemoryDepositStore {
    async fn upsert(&self, deposit: &CanonicalDeposit) -> Result<UpsertOutcome, DbError> {
        let mut rows = self.rows.lock().await;
        let existing = rows.iter_mut().find(|row| {
            row.contract_id == deposit.contract_id && row.external_id == deposit.external_id
        });

        match existing {
            Some(row) => {
                *row = deposit.clone();
                Ok(UpsertOutcome::Updated)
            }
            None => {
                rows.push(deposit.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn list_by_contract(
        &self,
        contract_id: &str,
        limit: usize,
    ) -> Result<Vec<CanonicalDeposit>, DbError> {
        let rows = self.rows.lock().await;
        // Insertion order stands in for the surrogate id on ties.
        let mut matching: Vec<(usize, &CanonicalDeposit)> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.contract_id == contract_id)
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| {
            b.occurred_at.cmp(&a.occurred_at).then(ib.cmp(ia))
        });

        Ok(matching
            .into_iter()
            .take(clamp_limit(limit))
            .map(|(_, row)| row.clone())
            .collect())
    }
}
