use std::sync::Mutex;

use anyhow::{Context, Result};
use ndarray::{ArrayD, IxDyn};
use tch::{CModule, Device, Kind, Tensor};

use crate::engine::Engine;
use crate::types::ModelCfg;

/// TorchScript module. The NHWC batch is passed unchanged; permute inside the
/// scripted module if it was trained channels-first.
pub struct TorchEngine {
    module: Mutex<CModule>,
    device: Device,
}

impl TorchEngine {
    pub fn new(cfg: &ModelCfg) -> Result<Self> {
        let device = if cfg.device.eq_ignore_ascii_case("gpu") {
            Device::cuda_if_available()
        } else {
            Device::Cpu
        };
        let mut module = CModule::load_on_device(&cfg.model_path, device)
            .with_context(|| format!("Torch: cannot load TorchScript module {}", cfg.model_path))?;
        module.set_eval();
        Ok(Self { module: Mutex::new(module), device })
    }
}

impl Engine for TorchEngine {
    fn name(&self) -> &'static str {
        "torch"
    }

    fn infer_array(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let x = Tensor::from_slice(&data).reshape(dims.as_slice()).to_device(self.device);

        let module = self
            .module
            .lock()
            .map_err(|_| anyhow::anyhow!("Torch module lock poisoned"))?;
        let y = tch::no_grad(|| module.forward_ts(&[x]))?;
        let y = y.to_kind(Kind::Float).to_device(Device::Cpu);

        let shape: Vec<usize> = y.size().iter().map(|&d| d as usize).collect();
        let flat: Vec<f32> = Vec::<f32>::try_from(y.flatten(0, -1))?;
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), flat)?)
    }
}
