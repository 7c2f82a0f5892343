pub mod health;
pub mod lots;
pub mod params;
pub mod pnl;
pub mod recalculate;
pub mod transactions;

use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::Ingestor;
use crate::query::PnlQueries;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub ingestor: Ingestor,
    pub queries: PnlQueries,
    /// Cancelled on shutdown; long-running requests take child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        ingestor: Ingestor,
        queries: PnlQueries,
    ) -> Self {
        Self {
            repo,
            config,
            ingestor,
            queries,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/transactions", post(transactions::post_transaction))
        .route("/v1/recalculate", post(recalculate::post_recalculate))
        .route("/v1/pnl/summary", get(pnl::get_summary))
        .route("/v1/pnl/unrealized", get(pnl::get_unrealized))
        .route("/v1/pnl/realized", get(pnl::get_realized))
        .route("/v1/lots", get(lots::get_lots))
        .layer(cors)
        .with_state(state)
}
