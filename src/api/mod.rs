pub mod health;
pub mod prices;
pub mod snapshots;

use crate::db::Repository;
use crate::domain::Timestamp;
use crate::error::AppError;
use crate::orchestration::Rebalancer;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub rebalancer: Arc<Rebalancer>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/v1/indices/:index_id/snapshots",
            get(snapshots::get_snapshots),
        )
        .route(
            "/v1/indices/:index_id/snapshots/latest",
            get(snapshots::get_latest_snapshot),
        )
        .route("/v1/indices/:index_id/prices", get(prices::get_prices))
        .layer(cors)
        .with_state(state)
}

/// Validate an optional `[from, to]` window given in unix seconds.
fn parse_range(
    from: Option<i64>,
    to: Option<i64>,
) -> Result<(Option<Timestamp>, Option<Timestamp>), AppError> {
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(AppError::BadRequest("from must not be after to".into()));
        }
    }
    Ok((from.map(Timestamp::new), to.map(Timestamp::new)))
}
