use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Roles {
    pub approver: String,
    pub service_provider: String,
    pub platform_address: String,
    pub release_signer: String,
    pub dispute_resolver: String,
    pub receiver: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trustline {
    pub address: String,
    pub decimals: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Milestone {
    pub description: String,
    /// Only multi-release milestones carry their own amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
}

/// Escrow released in one payment once its milestone is approved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SingleReleaseEscrow {
    pub contract_id: String,
    pub contract_base_id: String,
    pub signer: String,
    pub engagement_id: String,
    pub title: String,
    pub description: String,
    pub roles: Roles,
    #[serde(alias = "amountRaw")]
    pub amount: i64,
    #[serde(alias = "balanceRaw")]
    pub balance: i64,
    pub platform_fee: i64,
    pub milestones: Vec<Milestone>,
    pub trustline: Trustline,
    pub receiver_memo: i64,
}

/// Escrow paying out per milestone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiReleaseEscrow {
    pub contract_id: String,
    pub contract_base_id: String,
    pub signer: String,
    pub engagement_id: String,
    pub title: String,
    pub description: String,
    pub roles: Roles,
    pub platform_fee: i64,
    pub milestones: Vec<Milestone>,
    pub trustline: Trustline,
    pub receiver_memo: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowKind {
    Single,
    Multi,
}

impl EscrowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowKind::Single => "single",
            EscrowKind::Multi => "multi",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(EscrowKind::Single),
            "multi" => Some(EscrowKind::Multi),
            _ => None,
        }
    }

    /// Bodies that carry an `amount` (or `amountRaw`) field are single-release.
    pub fn detect(body: &Value) -> Self {
        if body.get("amount").is_some() || body.get("amountRaw").is_some() {
            EscrowKind::Single
        } else {
            EscrowKind::Multi
        }
    }
}

/// An escrow as stored: its kind plus the full document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRecord {
    pub contract_id: String,
    pub kind: EscrowKind,
    pub document: Value,
}

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("contractId is required")]
    MissingContractId,

    #[error("Escrow {0} not found")]
    NotFound(String),

    #[error("Invalid escrow document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}
