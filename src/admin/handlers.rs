use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::builder::{ComponentStatus, Status};
use crate::health::HealthStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    /// Graphs applied since startup.
    pub generation: u64,
    pub components: usize,
    pub errors: usize,
}

#[derive(Deserialize)]
pub struct ComponentFilter {
    pub status: Option<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let report = state.runtime.report();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        generation: state.runtime.generation(),
        components: report.len(),
        errors: report.error_count(),
    })
}

pub async fn get_components(
    State(state): State<AdminState>,
    Query(filter): Query<ComponentFilter>,
) -> Json<Vec<ComponentStatus>> {
    let wanted = match filter.status.as_deref() {
        Some("enabled") => Some(Status::Enabled),
        Some("disabled") => Some(Status::Disabled),
        _ => None,
    };

    let components = state
        .runtime
        .report()
        .entries()
        .into_iter()
        .filter(|c| wanted.map_or(true, |status| c.status == status))
        .collect();
    Json(components)
}

pub async fn get_health(State(state): State<AdminState>) -> Json<BTreeMap<String, HealthStatus>> {
    Json(state.runtime.health().snapshot())
}
