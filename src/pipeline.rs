//! The classification service: decode → normalize → tensor → inference →
//! decision → category lookup.
//!
//! A [`Classifier`] is built once at startup and shared read-only by every
//! request. If the model artifact failed to load, the classifier still exists
//! and answers every request with [`PipelineError::ModelUnavailable`].

use std::time::Instant;

use anyhow::Result;
use ndarray::ArrayD;
use tracing::{debug, error, info, warn};

use crate::engine::{first_row, Engine, EngineFactory};
use crate::error::PipelineError;
use crate::policy::{ClassScore, DecisionPolicy, Outcome};
use crate::preprocess::{ImageNormalizer, TensorAdapter};
use crate::taxonomy::{CategoryInfo, Taxonomy};
use crate::types::{Config, InputSpec};

pub enum ModelHandle {
    Loaded(Box<dyn Engine>),
    Unavailable { reason: String },
}

impl ModelHandle {
    /// Loads the configured artifact. A failure is kept as `Unavailable`
    /// instead of aborting; the server keeps answering.
    pub fn load(cfg: &Config) -> Self {
        match EngineFactory::create(&cfg.model) {
            Ok(engine) => {
                info!("model loaded: backend={}, path={}", engine.name(), cfg.model.model_path);
                ModelHandle::Loaded(engine)
            }
            Err(e) => {
                error!("model could not be loaded from {}: {:#}", cfg.model.model_path, e);
                ModelHandle::Unavailable { reason: format!("{:#}", e) }
            }
        }
    }
}

/// Successful result of one request, Unknown included.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub outcome: Outcome,
    pub confidence: f64,
    pub category: CategoryInfo,
    pub top3: Option<Vec<ClassScore>>,
    pub all_predictions: Option<Vec<ClassScore>>,
}

pub struct Classifier {
    model: ModelHandle,
    spec: InputSpec,
    normalizer: ImageNormalizer,
    adapter: TensorAdapter,
    policy: DecisionPolicy,
    taxonomy: Taxonomy,
}

impl Classifier {
    pub fn new(model: ModelHandle, cfg: &Config, taxonomy: Taxonomy) -> Self {
        let spec = cfg.input_spec();
        Self {
            model,
            spec,
            normalizer: ImageNormalizer::from_cfg(&cfg.model),
            adapter: TensorAdapter::new(spec, cfg.model.input_scale),
            policy: DecisionPolicy::from_cfg(&cfg.policy),
            taxonomy,
        }
    }

    /// Loads the model and, if it loaded, checks it against the config and taxonomy.
    pub fn load(cfg: &Config, taxonomy: Taxonomy) -> Result<Self> {
        let classifier = Self::new(ModelHandle::load(cfg), cfg, taxonomy);
        classifier.verify()?;
        Ok(classifier)
    }

    /// Startup consistency checks. Skipped when the model is unavailable.
    ///
    /// - the artifact's declared pixel range (if any) must equal `input_scale`
    /// - a probe inference must yield exactly one score per taxonomy class
    pub fn verify(&self) -> Result<()> {
        let ModelHandle::Loaded(engine) = &self.model else {
            return Ok(());
        };

        let configured = self.adapter.scale;
        match engine.declared_input_scale() {
            Some(declared) => anyhow::ensure!(
                declared == configured,
                "model declares input_scale={} but config has input_scale={}",
                declared,
                configured
            ),
            None => warn!(
                "{} model carries no input_scale metadata; trusting configured input_scale={}",
                engine.name(),
                configured
            ),
        }

        let probe = ArrayD::<f32>::zeros(self.spec.shape().to_vec());
        let output = engine.infer_array(probe)?;
        let scores = first_row(&output)?;
        self.taxonomy.check_output_len(scores.len())?;

        info!(
            "model verified: {} classes, taxonomy {}, input {}x{} ({})",
            scores.len(),
            self.taxonomy.version(),
            self.spec.width,
            self.spec.height,
            configured
        );
        Ok(())
    }

    pub fn engine(&self) -> Result<&dyn Engine, PipelineError> {
        match &self.model {
            ModelHandle::Loaded(engine) => Ok(engine.as_ref()),
            ModelHandle::Unavailable { .. } => Err(PipelineError::ModelUnavailable),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.model, ModelHandle::Loaded(_))
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.model {
            ModelHandle::Loaded(_) => None,
            ModelHandle::Unavailable { reason } => Some(reason),
        }
    }

    pub fn backend(&self) -> Option<&'static str> {
        self.engine().ok().map(|e| e.name())
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Runs the full pipeline on one upload. Blocking.
    pub fn classify(&self, bytes: &[u8]) -> Result<Classification, PipelineError> {
        let engine = self.engine()?;
        let started = Instant::now();

        let image = self.normalizer.run(bytes)?;
        let tensor = self.adapter.run(&image)?;
        let scores = self.invoke(engine, tensor)?;
        let decision = self.policy.decide(&scores, &self.taxonomy)?;
        let category = self.taxonomy.category_for(&decision.outcome).clone();

        debug!(
            "classified as {} ({:.2}%) in {} ms",
            decision.outcome.label(),
            decision.confidence,
            started.elapsed().as_millis()
        );

        Ok(Classification {
            outcome: decision.outcome,
            confidence: decision.confidence,
            category,
            top3: decision.top3,
            all_predictions: decision.all_predictions,
        })
    }

    fn invoke(&self, engine: &dyn Engine, tensor: ArrayD<f32>) -> Result<Vec<f32>, PipelineError> {
        self.spec.validate(tensor.shape()).map_err(PipelineError::inference)?;
        let output = engine.infer_array(tensor).map_err(PipelineError::inference)?;
        first_row(&output).map_err(PipelineError::inference)
    }
}
