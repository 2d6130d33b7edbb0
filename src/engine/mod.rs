use anyhow::Result;
use ndarray::{ArrayD, Axis};

use crate::types::{InputScale, ModelCfg};

#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "torch")]
pub mod torch;
#[cfg(feature = "tensorflow")]
pub mod tensorflow;

/// A loaded model artifact. Implementations must be safe to call from several
/// request tasks; backends whose runtime needs `&mut` keep a lock inside.
pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;
    fn infer_array(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Pixel range the artifact says it was trained on, if it records one.
    fn declared_input_scale(&self) -> Option<InputScale> {
        None
    }
}

/// First batch row of a model output as a flat score vector.
pub fn first_row(output: &ArrayD<f32>) -> Result<Vec<f32>> {
    let row = match output.ndim() {
        0 => anyhow::bail!("model output is a scalar"),
        1 => output.iter().copied().collect::<Vec<_>>(),
        _ => {
            anyhow::ensure!(output.shape()[0] >= 1, "model output has an empty batch");
            output.index_axis(Axis(0), 0).iter().copied().collect()
        }
    };
    anyhow::ensure!(!row.is_empty(), "model output row is empty");
    Ok(row)
}

pub struct EngineFactory;

impl EngineFactory {
    pub fn create(cfg: &ModelCfg) -> Result<Box<dyn Engine>> {
        match cfg.backend.as_str() {
            #[cfg(feature = "onnx")]
            "onnx" => Ok(Box::new(crate::engine::onnx::OnnxEngine::new(cfg)?)),

            #[cfg(feature = "torch")]
            "torch" => Ok(Box::new(crate::engine::torch::TorchEngine::new(cfg)?)),

            #[cfg(feature = "tensorflow")]
            "tensorflow" => Ok(Box::new(crate::engine::tensorflow::TfEngine::new(cfg)?)),

            other => anyhow::bail!(
                "backend '{}' not supported (build with features: onnx, torch, tensorflow)",
                other
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, arr0};

    #[test]
    fn test_first_row_of_batch() {
        let out = arr2(&[[0.1f32, 0.9], [0.5, 0.5]]).into_dyn();
        assert_eq!(first_row(&out).unwrap(), vec![0.1, 0.9]);
    }

    #[test]
    fn test_first_row_flat_vector() {
        let out = arr1(&[0.2f32, 0.3, 0.5]).into_dyn();
        assert_eq!(first_row(&out).unwrap(), vec![0.2, 0.3, 0.5]);
    }

    #[test]
    fn test_first_row_rejects_degenerate() {
        assert!(first_row(&arr0(1.0f32).into_dyn()).is_err());
        assert!(first_row(&ArrayD::<f32>::zeros(vec![0, 6])).is_err());
        assert!(first_row(&ArrayD::<f32>::zeros(vec![1, 0])).is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let cfg: crate::types::ModelCfg = toml::from_str(
            r#"
            backend = "caffe"
            model_path = "m"
            height = 1
            width = 1
            input_scale = "unit"
            "#,
        )
        .unwrap();
        let err = EngineFactory::create(&cfg).err().unwrap();
        assert!(err.to_string().contains("caffe"));
    }
}
