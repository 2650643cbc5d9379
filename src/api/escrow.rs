use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::escrow::{EscrowError, EscrowKind, EscrowRecord, MultiReleaseEscrow, SingleReleaseEscrow};

/// Parses `body` into the typed shape for `kind` and returns it as the
/// document to store. A path `contract_id` replaces any id in the body.
fn canonical_document(
    kind: EscrowKind,
    body: Value,
    contract_id: Option<&str>,
) -> Result<(String, Value), EscrowError> {
    let document = match kind {
        EscrowKind::Single => {
            let mut escrow: SingleReleaseEscrow = serde_json::from_value(body)?;
            if let Some(id) = contract_id {
                escrow.contract_id = id.to_string();
            }
            serde_json::to_value(escrow)?
        }
        EscrowKind::Multi => {
            let mut escrow: MultiReleaseEscrow = serde_json::from_value(body)?;
            if let Some(id) = contract_id {
                escrow.contract_id = id.to_string();
            }
            serde_json::to_value(escrow)?
        }
    };

    let id = document
        .get("contractId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(EscrowError::MissingContractId)?
        .to_string();
    Ok((id, document))
}

/// `kind` of `None` detects the kind from the body.
async fn save(
    state: &AppState,
    kind: Option<EscrowKind>,
    body: &[u8],
    contract_id: Option<&str>,
) -> ApiResult<Json<Value>> {
    let body: Value = serde_json::from_slice(body).map_err(EscrowError::from)?;
    let kind = kind.unwrap_or_else(|| EscrowKind::detect(&body));
    let (id, document) = canonical_document(kind, body, contract_id)?;

    let outcome = state.escrows.upsert(kind, &id, &document).await?;
    tracing::info!("Escrow {} {} as {}", id, outcome.as_str(), kind.as_str());

    Ok(Json(json!({ "ok": true, "contractId": id })))
}

pub async fn create_single(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    save(&state, Some(EscrowKind::Single), &body, None).await
}

pub async fn create_multi(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    save(&state, Some(EscrowKind::Multi), &body, None).await
}

/// Kind is taken from the body: an `amount` field means single-release.
pub async fn replace(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    save(&state, None, &body, Some(&contract_id)).await
}

pub async fn get(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
) -> ApiResult<Json<EscrowRecord>> {
    state
        .escrows
        .get(&contract_id)
        .await?
        .map(Json)
        .ok_or_else(|| EscrowError::NotFound(contract_id).into())
}

pub async fn delete(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.escrows.delete(&contract_id).await? {
        return Err(ApiError::from(EscrowError::NotFound(contract_id)));
    }
    Ok(Json(json!({ "ok": true, "deleted": contract_id })))
}
