//! HTTP surface: health, deposit ingestion and listing, escrow CRUD.

mod deposits;
mod error;
mod escrow;
mod health;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::deposits::{DepositStore, IngestionService};
use crate::escrow::EscrowStore;

pub use deposits::{parse_limit, IngestionResponse};
pub use error::{ApiError, ApiResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub deposits: Arc<dyn DepositStore>,
    pub escrows: Arc<dyn EscrowStore>,
    /// Cancelled on process shutdown; each run observes a child of it.
    pub shutdown: CancellationToken,
}

pub fn create_router(state: AppState) -> Router {
    let bounded = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/deposits/:contract_id", get(deposits::list_deposits))
        .route("/escrows/single", post(escrow::create_single))
        .route("/escrows/multi", post(escrow::create_multi))
        .route(
            "/escrows/:contract_id",
            get(escrow::get).put(escrow::replace).delete(escrow::delete),
        )
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    // Ingestion is bounded by the service's run deadline, not the request timeout.
    Router::new()
        .route(
            "/index/funder-deposits/:contract_id",
            post(deposits::index_funder_deposits),
        )
        .merge(bounded)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
