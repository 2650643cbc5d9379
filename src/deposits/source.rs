//! Fetches raw contract events over a bounded ledger window.

use std::sync::Arc;

use async_trait::async_trait;

use crate::rpc::{EventFeed, EventsRequest, RawEvent, RpcError};
use crate::types::config::ingestion::IngestionConfig;

/// Produces the raw events one ingestion run works on.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(&self, contract_id: &str) -> Result<Vec<RawEvent>, RpcError>;
}

/// Inclusive ledger range requested on the first page of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerWindow {
    pub start: u32,
    pub end: u32,
}

impl LedgerWindow {
    /// Window of `lookback` ledgers ending at the tip. The start never drops
    /// below ledger 1.
    pub fn ending_at(latest_ledger: u32, lookback: u32) -> Self {
        Self {
            start: latest_ledger.saturating_sub(lookback).max(1),
            end: latest_ledger,
        }
    }
}

/// Walks the cursor-paginated event feed for the window behind the tip.
pub struct LedgerWindowSource {
    feed: Arc<dyn EventFeed>,
    lookback_ledgers: u32,
    page_limit: u32,
    max_events: usize,
}

impl LedgerWindowSource {
    pub fn new(feed: Arc<dyn EventFeed>, config: &IngestionConfig) -> Self {
        Self {
            feed,
            lookback_ledgers: config.lookback_ledgers,
            page_limit: config.page_limit,
            max_events: config.max_events,
        }
    }
}

#[async_trait]
impl EventSource for LedgerWindowSource {
    async fn fetch_events(&self, contract_id: &str) -> Result<Vec<RawEvent>, RpcError> {
        let latest_ledger = self.feed.latest_ledger().await?;
        let window = LedgerWindow::ending_at(latest_ledger, self.lookback_ledgers);

        tracing::debug!(
            "Fetching events for {} over ledgers {}-{}",
            contract_id,
            window.start,
            window.end
        );

        let mut events: Vec<RawEvent> = Vec::with_capacity(self.max_events.min(256));
        let mut request =
            EventsRequest::first_page(contract_id, window.start, window.end, self.page_limit);
        let mut pages = 0usize;
        let mut feed_tip = latest_ledger;

        loop {
            let page = self.feed.events_page(&request).await?;
            pages += 1;
            feed_tip = feed_tip.max(page.latest_ledger);

            let received = page.events.len();
            events.extend(page.events);

            if page.cursor.is_empty() || received == 0 || events.len() >= self.max_events {
                break;
            }
            if request.pagination.cursor.as_deref() == Some(page.cursor.as_str()) {
                tracing::warn!(
                    "Event feed repeated cursor {} for {}, stopping pagination",
                    page.cursor,
                    contract_id
                );
                break;
            }

            request = EventsRequest::next_page(contract_id, &page.cursor, self.page_limit);
        }

        if events.len() > self.max_events {
            tracing::warn!(
                "Truncating {} events for {} to cap of {}",
                events.len(),
                contract_id,
                self.max_events
            );
            events.truncate(self.max_events);
        }

        tracing::debug!(
            "Fetched {} events for {} in {} page(s), feed tip {}",
            events.len(),
            contract_id,
            pages,
            feed_tip
        );
        Ok(events)
    }
}
