use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::pipeline::Classifier;

/// Shared, read-only state handed to every request.
pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier: Arc::new(classifier), started_at: Utc::now() }
    }
}

pub type SharedState = Arc<AppState>;
