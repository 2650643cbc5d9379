//! JSON-RPC 2.0 envelope and the `getEvents` wire shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<P>,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Result of `getLatestLedger`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatestLedger {
    pub sequence: u32,
}

/// Params of one `getEvents` page.
///
/// Only the first page of a walk carries the ledger window; later pages
/// carry the cursor alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ledger: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_ledger: Option<u32>,
    pub filters: Vec<EventFilter>,
    pub pagination: Pagination,
}

impl EventsRequest {
    pub fn first_page(contract_id: &str, start_ledger: u32, end_ledger: u32, limit: u32) -> Self {
        Self {
            start_ledger: Some(start_ledger),
            end_ledger: (end_ledger >= start_ledger).then_some(end_ledger),
            filters: vec![EventFilter::contract(contract_id)],
            pagination: Pagination {
                limit,
                cursor: None,
            },
        }
    }

    pub fn next_page(contract_id: &str, cursor: &str, limit: u32) -> Self {
        Self {
            start_ledger: None,
            end_ledger: None,
            filters: vec![EventFilter::contract(contract_id)],
            pagination: Pagination {
                limit,
                cursor: Some(cursor.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    #[serde(rename = "type")]
    pub filter_type: String,
    pub contract_ids: Vec<String>,
}

impl EventFilter {
    pub fn contract(contract_id: &str) -> Self {
        Self {
            filter_type: "contract".to_string(),
            contract_ids: vec![contract_id.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Result of `getEvents`. An empty `cursor` means the feed is exhausted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsPage {
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub latest_ledger: u32,
    #[serde(default)]
    pub cursor: String,
}

/// A contract event exactly as reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    pub ledger: u32,
    #[serde(default)]
    pub ledger_closed_at: String,
    pub contract_id: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub operation_index: i32,
    #[serde(default)]
    pub transaction_index: i32,
    #[serde(default)]
    pub topic: Vec<String>,
    /// Chain-native encoded payload, opaque to the indexer.
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub in_successful_contract_call: bool,
    pub tx_hash: String,
}
