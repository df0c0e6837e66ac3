use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::pipeline::IngestJob;
use crate::review::ReviewController;
use crate::storage::{BlobStore, Tables};

pub mod dashboard;
pub mod documents;
pub mod knowledge;
pub mod review;
pub mod types;
pub mod upload;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tables: Arc<Tables>,
    pub blob: Arc<dyn BlobStore>,
    pub jobs: mpsc::Sender<IngestJob>,
    pub review: Arc<ReviewController>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(upload::routes())
        .merge(documents::routes())
        .merge(review::routes())
        .merge(knowledge::routes())
        .merge(dashboard::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
