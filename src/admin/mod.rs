//! Admin API: build status and backend health.
//!
//! ```text
//! GET /api/status      version, applied generation, component and error counts
//! GET /api/components  per-component build report (?status=enabled|disabled)
//! GET /api/health      health state of every probed server
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;

use crate::runtime::Runtime;

use self::auth::require_api_key;
use self::handlers::{get_components, get_health, get_status};

#[derive(Clone)]
pub struct AdminState {
    pub runtime: Arc<Runtime>,
}

/// Admin routes. Every route requires `Authorization: Bearer <api_key>` when a key is set.
pub fn router(runtime: Arc<Runtime>, api_key: Option<String>) -> Router {
    let key: Option<Arc<str>> = api_key.map(Arc::from);
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/components", get(get_components))
        .route("/api/health", get(get_health))
        .layer(middleware::from_fn_with_state(key, require_api_key))
        .with_state(AdminState { runtime })
}
