//! Health check endpoint

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<&'static str>,
    pub taxonomy_version: String,
    pub started_at: DateTime<Utc>,
}

/// GET / - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let classifier = &state.classifier;
    Json(HealthResponse {
        status: "API is running".to_string(),
        model_loaded: classifier.is_loaded(),
        backend: classifier.backend(),
        taxonomy_version: classifier.taxonomy().version().to_string(),
        started_at: state.started_at,
    })
}
