//! In-process fixture feed for running the service without a chain endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use super::feed::EventFeed;
use super::rpc::RpcError;
use super::types::{EventsPage, EventsRequest, RawEvent};

const MOCK_LATEST_LEDGER: u32 = 123_460;

/// Serves two deposit events for whichever contract is asked for.
///
/// The value payload of each fixture is a plain decimal amount, so pair this
/// feed with `PlainValueDecoder`.
#[derive(Debug, Clone)]
pub struct MockEventFeed {
    anchor: DateTime<Utc>,
}

impl MockEventFeed {
    pub fn new() -> Self {
        Self { anchor: Utc::now() }
    }

    fn fixtures(&self, contract_id: &str) -> Vec<RawEvent> {
        let closed_at = |minutes_ago: i64| {
            (self.anchor - Duration::minutes(minutes_ago)).to_rfc3339_opts(SecondsFormat::Secs, true)
        };

        vec![
            RawEvent {
                event_type: "contract".to_string(),
                ledger: 123_456,
                ledger_closed_at: closed_at(3),
                contract_id: contract_id.to_string(),
                id: "0000530242871959552-0000000000".to_string(),
                operation_index: 0,
                transaction_index: 0,
                topic: vec![
                    "deposit".to_string(),
                    "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7".to_string(),
                ],
                value: "305000000".to_string(),
                in_successful_contract_call: true,
                tx_hash: "txhashA".to_string(),
            },
            RawEvent {
                event_type: "contract".to_string(),
                ledger: 123_457,
                ledger_closed_at: closed_at(1),
                contract_id: contract_id.to_string(),
                id: "0000530247166926848-0000000001".to_string(),
                operation_index: 1,
                transaction_index: 0,
                topic: vec![
                    "deposit".to_string(),
                    "GBRPYHIL2CI3FNQ4BXLFMNDLFJUNPU2HY3ZMFSHONUCEOASW7QC7OX2H".to_string(),
                ],
                value: "75000000".to_string(),
                in_successful_contract_call: true,
                tx_hash: "txhashB".to_string(),
            },
        ]
    }
}

impl Default for MockEventFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventFeed for MockEventFeed {
    async fn latest_ledger(&self) -> Result<u32, RpcError> {
        Ok(MOCK_LATEST_LEDGER)
    }

    async fn events_page(&self, request: &EventsRequest) -> Result<EventsPage, RpcError> {
        let events = request
            .filters
            .iter()
            .flat_map(|f| f.contract_ids.iter())
            .flat_map(|contract_id| self.fixtures(contract_id))
            .collect();

        Ok(EventsPage {
            events,
            latest_ledger: MOCK_LATEST_LEDGER,
            cursor: String::new(),
        })
    }
}
