//! Prediction endpoint. Every outcome, failures included, is answered with 200
//! and a JSON body; failures carry a single `error` field.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::pipeline::Classification;
use crate::policy::{round2, ClassScore};
use crate::server::state::SharedState;

const FILE_FIELD: &str = "file";

#[derive(Debug, Error)]
enum PredictError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("invalid upload: {0}")]
    Upload(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Serialize)]
pub struct PredictBody {
    pub prediction: String,
    pub confidence: f64,
    pub bin: String,
    pub advice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localized_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top3: Option<Vec<ClassScore>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_predictions: Option<Vec<ClassScore>>,
}

impl From<Classification> for PredictBody {
    fn from(c: Classification) -> Self {
        Self {
            prediction: c.outcome.label().to_string(),
            confidence: round2(c.confidence),
            bin: c.category.bin,
            advice: c.category.advice,
            localized_name: c.category.localized_name,
            top3: c.top3,
            all_predictions: c.all_predictions,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Classified(PredictBody),
    Failed { error: String },
}

/// POST /predict - classify the multipart field `file`
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<PredictResponse> {
    match classify_upload(&state, multipart).await {
        Ok(c) => {
            info!("prediction={} confidence={:.2}", c.outcome.label(), c.confidence);
            Json(PredictResponse::Classified(c.into()))
        }
        Err(e) => {
            warn!("prediction failed: {}", e);
            Json(PredictResponse::Failed { error: e.to_string() })
        }
    }
}

async fn classify_upload(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Classification, PredictError> {
    // fail fast before touching the body
    state.classifier.engine()?;

    let mut multipart = multipart.map_err(|e| PredictError::Upload(e.body_text()))?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PredictError::Upload(e.body_text()))?
    {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field.bytes().await.map_err(|e| PredictError::Upload(e.body_text()))?;
            upload = Some(bytes);
            break;
        }
    }
    let bytes = upload.ok_or(PredictError::MissingFile)?;

    let classifier = Arc::clone(&state.classifier);
    let result = tokio::task::spawn_blocking(move || classifier.classify(&bytes))
        .await
        .map_err(|e| PipelineError::inference(format!("inference task aborted: {}", e)))?;
    Ok(result?)
}
