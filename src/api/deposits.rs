use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::deposits::{CanonicalDeposit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

#[derive(Debug, Serialize)]
pub struct IngestionResponse {
    pub ok: bool,
    pub count: usize,
    pub deposits: Vec<CanonicalDeposit>,
}

/// Absent or non-numeric means the default; numbers are clamped to
/// `[1, MAX_LIST_LIMIT]`.
pub fn parse_limit(raw: Option<&str>) -> usize {
    let Some(raw) = raw.map(str::trim) else {
        return DEFAULT_LIST_LIMIT;
    };
    match raw.parse::<i64>() {
        Ok(n) => n.clamp(1, MAX_LIST_LIMIT as i64) as usize,
        // Too many digits for i64
        Err(_) if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => MAX_LIST_LIMIT,
        Err(_) => DEFAULT_LIST_LIMIT,
    }
}

pub async fn index_funder_deposits(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
) -> ApiResult<Json<IngestionResponse>> {
    let cancel = state.shutdown.child_token();
    let deposits = state.ingestion.run_ingestion(&contract_id, &cancel).await?;

    Ok(Json(IngestionResponse {
        ok: true,
        count: deposits.len(),
        deposits,
    }))
}

pub async fn list_deposits(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<CanonicalDeposit>>> {
    let limit = parse_limit(params.get("limit").map(String::as_str));
    let deposits = state
        .deposits
        .list_by_contract(&contract_id, limit)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    Ok(Json(deposits))
}
