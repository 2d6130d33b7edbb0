pub mod engine;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod preprocess;
pub mod server;
pub mod taxonomy;
pub mod types;

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::pipeline::Classifier;
use crate::server::state::AppState;
use crate::taxonomy::Taxonomy;
use crate::types::Config;

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Loads config, taxonomy and model, then serves until the listener fails.
pub async fn start_server(config_path: &Path, overrides: Overrides) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let mut cfg = Config::load(config_path)?;
    if let Some(host) = overrides.host {
        cfg.server.host = host;
    }
    if let Some(port) = overrides.port {
        cfg.server.port = port;
    }

    let spec = cfg.input_spec();
    info!(
        "starting server: backend={}, input={}x{}x{}, input_scale={}, center_crop={}, threshold={}",
        cfg.model.backend,
        spec.height,
        spec.width,
        spec.channels,
        cfg.model.input_scale,
        cfg.model.center_crop,
        cfg.policy.threshold
    );

    let taxonomy = Taxonomy::load(&cfg.taxonomy.path)?;
    info!("taxonomy {} loaded: {} classes", taxonomy.version(), taxonomy.len());

    let classifier = Classifier::load(&cfg, taxonomy)?;
    if let Some(reason) = classifier.unavailable_reason() {
        warn!("serving without a model, every prediction will fail: {}", reason);
    }

    let state = std::sync::Arc::new(AppState::new(classifier));
    server::serve(&cfg.server, state).await
}
