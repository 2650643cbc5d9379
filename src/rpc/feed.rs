use async_trait::async_trait;

use super::rpc::RpcError;
use super::types::{EventsPage, EventsRequest};

/// The two chain-endpoint calls ingestion depends on.
///
/// Each call is one request/response round-trip that fails as a unit; no
/// implementation retries internally.
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Current chain tip.
    async fn latest_ledger(&self) -> Result<u32, RpcError>;

    /// One page of contract events.
    async fn events_page(&self, request: &EventsRequest) -> Result<EventsPage, RpcError>;
}
