pub mod groups;
pub mod health;
pub mod summary;
pub mod transactions;

use crate::db::Repository;
use crate::orchestration::{Assembler, Ingestor};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub assembler: Arc<Assembler>,
    pub ingestor: Arc<Ingestor>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/api/transactions", get(transactions::list_transactions))
        .route("/api/load", post(transactions::load_export))
        .route("/api/groups", get(groups::list_groups))
        .route("/api/assemble", post(groups::assemble_groups))
        .route("/api/summary", get(summary::account_summary))
        .layer(cors)
        .with_state(state)
}
