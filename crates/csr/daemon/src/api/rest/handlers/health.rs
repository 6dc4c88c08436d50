//! Health handler

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use csr_checkpoints::DeliveryMode;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub storage: String,
    pub delivery_mode: DeliveryMode,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        storage: state.storage_backend.to_string(),
        delivery_mode: state.service.dispatcher().mode(),
    })
}
