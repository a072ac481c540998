use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

/// Presentation options applied on the way out; the board snapshot itself is untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub zero_as_letter_o: bool,
}

#[derive(Debug, Clone)]
pub struct ApiState {
    pub app: Arc<RwLock<AppState>>,
    pub render: RenderOptions,
}

pub fn router(app: Arc<RwLock<AppState>>, render: RenderOptions) -> Router {
    Router::new()
        .route("/api/board", get(handlers::get_board))
        .route("/api/health", get(handlers::get_health))
        .with_state(ApiState { app, render })
}
