//! ONNX Runtime engine (CPU, or CUDA with the `onnx-cuda` feature) for `ort = 2.0.0-rc.10`.
//!
//! - Input/output names come from the config, or the session's first input/output.
//! - Runs without a system ONNX install (feature `download-binaries`).
//! - If the exporter stored a custom metadata entry `input_scale` (`raw` or `unit`),
//!   it is reported through [`Engine::declared_input_scale`] and checked at startup.

use std::sync::Mutex;

use anyhow::{Context, Result};
use ndarray::ArrayD;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{DynValue, Tensor},
};

use crate::engine::Engine;
use crate::types::{InputScale, ModelCfg};

const INPUT_SCALE_KEY: &str = "input_scale";

pub struct OnnxEngine {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    declared_scale: Option<InputScale>,
}

impl OnnxEngine {
    pub fn new(cfg: &ModelCfg) -> Result<Self> {
        let mut builder = Session::builder().context("cannot create ONNX session builder")?;
        builder = builder.with_optimization_level(GraphOptimizationLevel::Level3)?;
        if let Some(threads) = cfg.intra_threads {
            builder = builder.with_intra_threads(threads)?;
        }

        #[cfg(feature = "onnx-cuda")]
        {
            if cfg.device.eq_ignore_ascii_case("gpu") {
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                ])?;
            }
        }

        let session = builder
            .commit_from_file(&cfg.model_path)
            .with_context(|| format!("cannot load ONNX model {}", cfg.model_path))?;

        let input_name = match &cfg.input_name {
            Some(name) => name.clone(),
            None => session
                .inputs
                .first()
                .map(|i| i.name.clone())
                .context("ONNX model declares no inputs")?,
        };
        let output_name = match &cfg.output_name {
            Some(name) => name.clone(),
            None => session
                .outputs
                .first()
                .map(|o| o.name.clone())
                .context("ONNX model declares no outputs")?,
        };

        let declared_scale = read_declared_scale(&session)?;

        Ok(Self { session: Mutex::new(session), input_name, output_name, declared_scale })
    }
}

fn read_declared_scale(session: &Session) -> Result<Option<InputScale>> {
    let metadata = session.metadata()?;
    let Some(value) = metadata.custom(INPUT_SCALE_KEY)? else {
        return Ok(None);
    };
    match InputScale::parse(&value) {
        Some(scale) => Ok(Some(scale)),
        None => {
            tracing::warn!("ignoring unrecognized {} metadata value {:?}", INPUT_SCALE_KEY, value);
            Ok(None)
        }
    }
}

impl Engine for OnnxEngine {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn infer_array(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("ONNX session lock poisoned"))?;

        let input_tensor: Tensor<f32> = Tensor::from_array(input)?;
        let outputs = session.run(ort::inputs![
            self.input_name.as_str() => input_tensor
        ])?;

        let dyn_out: &DynValue = &outputs[self.output_name.as_str()];
        let out_view = dyn_out
            .try_extract_array::<f32>()
            .map_err(|_| anyhow::anyhow!("ONNX: output {:?} is not a Tensor<f32>", self.output_name))?;

        Ok(out_view.to_owned())
    }

    fn declared_input_scale(&self) -> Option<InputScale> {
        self.declared_scale
    }
}
