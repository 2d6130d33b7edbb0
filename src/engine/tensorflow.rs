use anyhow::{Context, Result};
use ndarray::{ArrayD, IxDyn};
use tensorflow::{
    Graph, Operation, SavedModelBundle, SessionOptions, SessionRunArgs, Tensor as TfTensor,
    DEFAULT_SERVING_SIGNATURE_DEF_KEY,
};

use crate::engine::Engine;
use crate::types::ModelCfg;

const SERVE_TAG: &str = "serve";

/// Keras model exported as a SavedModel directory, run through its
/// `serving_default` signature.
pub struct TfEngine {
    bundle: SavedModelBundle,
    input_op: Operation,
    input_index: i32,
    output_op: Operation,
    output_index: i32,
}

impl TfEngine {
    pub fn new(cfg: &ModelCfg) -> Result<Self> {
        let mut graph = Graph::new();
        let bundle = SavedModelBundle::load(&SessionOptions::new(), [SERVE_TAG], &mut graph, &cfg.model_path)
            .with_context(|| format!("TensorFlow: cannot load SavedModel {}", cfg.model_path))?;

        let signature = bundle
            .meta_graph_def()
            .get_signature(DEFAULT_SERVING_SIGNATURE_DEF_KEY)
            .context("TensorFlow: SavedModel has no serving_default signature")?;

        let input_info = match &cfg.input_name {
            Some(name) => signature.get_input(name)?,
            None => signature
                .inputs()
                .values()
                .next()
                .context("TensorFlow: signature has no inputs")?,
        };
        let output_info = match &cfg.output_name {
            Some(name) => signature.get_output(name)?,
            None => signature
                .outputs()
                .values()
                .next()
                .context("TensorFlow: signature has no outputs")?,
        };

        let input_op = graph.operation_by_name_required(&input_info.name().name)?;
        let output_op = graph.operation_by_name_required(&output_info.name().name)?;
        let input_index = input_info.name().index;
        let output_index = output_info.name().index;

        Ok(Self { bundle, input_op, input_index, output_op, output_index })
    }
}

impl Engine for TfEngine {
    fn name(&self) -> &'static str {
        "tensorflow"
    }

    fn infer_array(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let dims: Vec<u64> = input.shape().iter().map(|&d| d as u64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let tf_tensor = TfTensor::<f32>::new(&dims).with_values(&data)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&self.input_op, self.input_index, &tf_tensor);
        let out_token = args.request_fetch(&self.output_op, self.output_index);

        self.bundle.session.run(&mut args)?;
        let output: TfTensor<f32> = args.fetch(out_token)?;

        let shape: Vec<usize> = output.dims().iter().map(|&d| d as usize).collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), output.to_vec())?)
    }
}
