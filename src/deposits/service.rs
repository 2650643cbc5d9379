//! One on-demand ingestion run: fetch, normalize, persist, read back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::normalizer::DepositNormalizer;
use super::source::EventSource;
use super::store::DepositStore;
use super::types::{CanonicalDeposit, UpsertOutcome};
use crate::db::DbError;
use crate::rpc::RpcError;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Failed to fetch events: {0}")]
    Fetch(#[from] RpcError),

    #[error("Failed to read back deposits: {0}")]
    ReadBack(DbError),

    #[error("Ingestion cancelled")]
    Cancelled,

    #[error("Ingestion did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}

/// Counters for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub fetched: usize,
    pub skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct IngestionService {
    source: Arc<dyn EventSource>,
    normalizer: DepositNormalizer,
    store: Arc<dyn DepositStore>,
    read_back_limit: usize,
    run_timeout: Option<Duration>,
}

impl IngestionService {
    pub fn new(
        source: Arc<dyn EventSource>,
        normalizer: DepositNormalizer,
        store: Arc<dyn DepositStore>,
        read_back_limit: usize,
    ) -> Self {
        Self {
            source,
            normalizer,
            store,
            read_back_limit,
            run_timeout: None,
        }
    }

    /// Bounds a whole run. Without it only the per-call RPC timeout applies.
    pub fn with_run_timeout(mut self, limit: Duration) -> Self {
        self.run_timeout = Some(limit);
        self
    }

    /// Runs one ingestion for `contract_id` and returns its most recent
    /// stored deposits.
    ///
    /// A failed fetch aborts the run before anything is written. A failed
    /// write of one record is logged and the run moves on to the next.
    pub async fn run_ingestion(
        &self,
        contract_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CanonicalDeposit>, IngestionError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Ingestion for {} cancelled", contract_id);
                Err(IngestionError::Cancelled)
            }
            result = self.ingest_within_deadline(contract_id) => result,
        }
    }

    async fn ingest_within_deadline(
        &self,
        contract_id: &str,
    ) -> Result<Vec<CanonicalDeposit>, IngestionError> {
        let Some(limit) = self.run_timeout else {
            return self.ingest(contract_id).await;
        };

        match tokio::time::timeout(limit, self.ingest(contract_id)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("Ingestion for {} exceeded its {:?} deadline", contract_id, limit);
                Err(IngestionError::DeadlineExceeded(limit))
            }
        }
    }

    async fn ingest(&self, contract_id: &str) -> Result<Vec<CanonicalDeposit>, IngestionError> {
        let started = Instant::now();
        let events = self.source.fetch_events(contract_id).await.map_err(|e| {
            tracing::error!("Fetching events for {} failed: {}", contract_id, e);
            IngestionError::Fetch(e)
        })?;

        let mut stats = IngestionStats {
            fetched: events.len(),
            ..Default::default()
        };

        for event in &events {
            let Some(deposit) = self.normalizer.normalize(event) else {
                stats.skipped += 1;
                continue;
            };

            match self.store.upsert(&deposit).await {
                Ok(UpsertOutcome::Inserted) => stats.inserted += 1,
                Ok(UpsertOutcome::Updated) => stats.updated += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        "Failed to persist deposit {} for {}: {}",
                        deposit.external_id,
                        contract_id,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Ingested {}: {} events, {} inserted, {} updated, {} skipped, {} failed in {:?}",
            contract_id,
            stats.fetched,
            stats.inserted,
            stats.updated,
            stats.skipped,
            stats.failed,
            started.elapsed()
        );

        self.store
            .list_by_contract(contract_id, self.read_back_limit)
            .await
            .map_err(IngestionError::ReadBack)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::deposits::memory::MemoryDepositStore;
    use crate::deposits::normalizer::{OpaqueValueDecoder, PlainValueDecoder};
    use crate::rpc::RawEvent;

    const ACCOUNT_A: &str = "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7";
    const ACCOUNT_B: &str = "GBRPYHIL2CI3FNQ4BXLFMNDLFJUNPU2HY3ZMFSHONUCEOASW7QC7OX2H";

    fn event(tx: &str, op: i32, closed_at: &str, depositor: &str, amount: &str) -> RawEvent {
        RawEvent {
            event_type: "contract".to_string(),
            ledger: 123_456,
            ledger_closed_at: closed_at.to_string(),
            contract_id: "C1".to_string(),
            id: format!("{}-{}", tx, op),
            operation_index: op,
            transaction_index: 0,
            topic: vec!["deposit".to_string(), depositor.to_string()],
            value: amount.to_string(),
            in_successful_contract_call: true,
            tx_hash: tx.to_string(),
        }
    }

    fn two_deposits() -> Vec<RawEvent> {
        vec![
            event("txA", 0, "2025-03-01T12:00:00Z", ACCOUNT_A, "305000000"),
            event("txB", 1, "2025-03-01T12:02:00Z", ACCOUNT_B, "75000000"),
        ]
    }

    /// Returns canned events, or an error once `fail` is set.
    struct StaticSource {
        events: Mutex<Vec<RawEvent>>,
        fail: bool,
    }

    impl StaticSource {
        fn new(events: Vec<RawEvent>) -> Self {
            Self {
                events: Mutex::new(events),
                fail: false,
            }
        }

        fn set(&self, events: Vec<RawEvent>) {
            *self.events.lock().unwrap() = events;
        }
    }

    #[async_trait]
    impl EventSource for StaticSource {
        async fn fetch_events(&self, _contract_id: &str) -> Result<Vec<RawEvent>, RpcError> {
            if self.fail {
                return Err(RpcError::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(self.events.lock().unwrap().clone())
        }
    }

    /// Never resolves, so only cancellation or the run deadline can end it.
    struct StalledSource;

    /// Each page is well under any per-call limit; the walk as a whole is
    /// not.
    struct SlowPagesSource {
        pages: usize,
        per_page: Duration,
    }

    #[async_trait]
    impl EventSource for SlowPagesSource {
        async fn fetch_events(&self, _contract_id: &str) -> Result<Vec<RawEvent>, RpcError> {
            for _ in 0..self.pages {
                tokio::time::sleep(self.per_page).await;
            }
            Ok(two_deposits())
        }
    }

    #[async_trait]
    impl EventSource for StalledSource {
        async fn fetch_events(&self, _contract_id: &str) -> Result<Vec<RawEvent>, RpcError> {
            std::future::pending().await
        }
    }

    /// Fails writes for one external id and counts every attempt.
    struct FlakyStore {
        inner: MemoryDepositStore,
        poisoned: &'static str,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl DepositStore for FlakyStore {
        async fn upsert(&self, deposit: &CanonicalDeposit) -> Result<UpsertOutcome, DbError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if deposit.external_id == self.poisoned {
                return Err(DbError::UnexpectedResult("connection reset".to_string()));
            }
            self.inner.upsert(deposit).await
        }

        async fn list_by_contract(
            &self,
            contract_id: &str,
            limit: usize,
        ) -> Result<Vec<CanonicalDeposit>, DbError> {
            self.inner.list_by_contract(contract_id, limit).await
        }
    }

    fn service(source: Arc<dyn EventSource>, store: Arc<dyn DepositStore>) -> IngestionService {
        let normalizer = DepositNormalizer::new(Arc::new(PlainValueDecoder), "test");
        IngestionService::new(source, normalizer, store, 50)
    }

    #[tokio::test]
    async fn test_run_persists_and_returns_newest_first() {
        let store = Arc::new(MemoryDepositStore::new());
        let service = service(Arc::new(StaticSource::new(two_deposits())), store.clone());

        let deposits = service
            .run_ingestion("C1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(deposits.len(), 2);
        assert_eq!(deposits[0].external_id, "txB#1");
        assert_eq!(deposits[0].depositor, ACCOUNT_B);
        assert_eq!(deposits[0].amount_raw, "75000000");
        assert_eq!(deposits[1].external_id, "txA#0");
        assert_eq!(deposits[1].amount_raw, "305000000");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_instead_of_duplicating() {
        let store = Arc::new(MemoryDepositStore::new());
        let source = Arc::new(StaticSource::new(two_deposits()));
        let service = service(source.clone(), store.clone());
        let cancel = CancellationToken::new();

        service.run_ingestion("C1", &cancel).await.unwrap();

        let mut changed = two_deposits();
        changed[0].value = "999".to_string();
        source.set(changed);
        let deposits = service.run_ingestion("C1", &cancel).await.unwrap();

        assert_eq!(store.len().await, 2);
        let txa = deposits.iter().find(|d| d.external_id == "txA#0").unwrap();
        assert_eq!(txa.amount_raw, "999");
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_the_run() {
        let store = Arc::new(FlakyStore {
            inner: MemoryDepositStore::new(),
            poisoned: "txA#0",
            attempts: AtomicUsize::new(0),
        });
        let mut events = two_deposits();
        events.push(event("txC", 0, "2025-03-01T12:05:00Z", ACCOUNT_A, "1"));
        let service = service(Arc::new(StaticSource::new(events)), store.clone());

        let deposits = service
            .run_ingestion("C1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        let ids: Vec<_> = deposits.iter().map(|d| d.external_id.as_str()).collect();
        assert_eq!(ids, vec!["txC#0", "txB#1"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let store = Arc::new(MemoryDepositStore::new());
        let source = StaticSource {
            fail: true,
            ..StaticSource::new(two_deposits())
        };
        let service = service(Arc::new(source), store.clone());

        let err = service
            .run_ingestion("C1", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestionError::Fetch(RpcError::Http { status: 503, .. })));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_zero_and_empty_amounts_never_reach_the_store() {
        let store = Arc::new(MemoryDepositStore::new());
        let events = vec![
            event("txA", 0, "2025-03-01T12:00:00Z", ACCOUNT_A, "0"),
            event("txB", 0, "2025-03-01T12:00:00Z", ACCOUNT_A, ""),
            event("txC", 0, "2025-03-01T12:00:00Z", "GDUMMYDEPOSITOR111", "10"),
        ];
        let service = service(Arc::new(StaticSource::new(events)), store.clone());

        let deposits = service
            .run_ingestion("C1", &CancellationToken::new())
            .await
            .unwrap();

        assert!(deposits.is_empty());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_opaque_decoder_persists_nothing() {
        let store = Arc::new(MemoryDepositStore::new());
        let normalizer = DepositNormalizer::new(Arc::new(OpaqueValueDecoder), "soroban_rpc");
        let service = IngestionService::new(
            Arc::new(StaticSource::new(two_deposits())),
            normalizer,
            store.clone(),
            50,
        );

        let deposits = service
            .run_ingestion("C1", &CancellationToken::new())
            .await
            .unwrap();

        assert!(deposits.is_empty());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_read_back_respects_limit() {
        let store = Arc::new(MemoryDepositStore::new());
        let events = (0..5)
            .map(|op| event("txA", op, "2025-03-01T12:00:00Z", ACCOUNT_A, "10"))
            .collect();
        let normalizer = DepositNormalizer::new(Arc::new(PlainValueDecoder), "test");
        let service =
            IngestionService::new(Arc::new(StaticSource::new(events)), normalizer, store.clone(), 3);

        let deposits = service
            .run_ingestion("C1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(deposits.len(), 3);
        assert_eq!(store.len().await, 5);
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_promptly() {
        let store = Arc::new(MemoryDepositStore::new());
        let service = service(Arc::new(StalledSource), store);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service.run_ingestion("C1", &cancel).await.unwrap_err();

        assert!(matches!(err, IngestionError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_deadline_fails_the_run() {
        let store = Arc::new(MemoryDepositStore::new());
        let source = SlowPagesSource {
            pages: 50,
            per_page: Duration::from_millis(100),
        };
        let service =
            service(Arc::new(source), store.clone()).with_run_timeout(Duration::from_millis(150));

        let err = service
            .run_ingestion("C1", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestionError::DeadlineExceeded(d) if d == Duration::from_millis(150)));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_run_within_deadline_succeeds() {
        let store = Arc::new(MemoryDepositStore::new());
        let source = SlowPagesSource {
            pages: 2,
            per_page: Duration::from_millis(10),
        };
        let service = service(Arc::new(source), store).with_run_timeout(Duration::from_secs(5));

        let deposits = service
            .run_ingestion("C1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(deposits.len(), 2);
    }
}
