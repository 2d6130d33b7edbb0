use std::path::{Path, PathBuf};

use anyhow::Context;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Shape the model expects: NHWC, batch is always 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl InputSpec {
    pub fn new(height: usize, width: usize) -> Self {
        Self { batch: 1, height, width, channels: 3 }
    }

    pub fn shape(&self) -> [usize; 4] {
        [self.batch, self.height, self.width, self.channels]
    }

    pub fn validate(&self, shape: &[usize]) -> anyhow::Result<()> {
        anyhow::ensure!(shape.len() == 4, "input must be 4D (NHWC), got {:?}", shape);
        anyhow::ensure!(shape[0] == self.batch, "batch size mismatch: {} != {}", shape[0], self.batch);
        anyhow::ensure!(
            shape[1] == self.height && shape[2] == self.width,
            "H/W mismatch: expected {}x{}, got {}x{}",
            self.height,
            self.width,
            shape[1],
            shape[2]
        );
        anyhow::ensure!(shape[3] == self.channels, "channel mismatch: {} != {}", shape[3], self.channels);
        Ok(())
    }
}

/// How pixel values are handed to the model. Must match how the artifact was trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputScale {
    /// 0..=255 unchanged; the model carries its own rescaling layer.
    Raw,
    /// Divided by 255.0 into [0, 1].
    Unit,
}

impl InputScale {
    pub fn factor(self) -> f32 {
        match self {
            InputScale::Raw => 1.0,
            InputScale::Unit => 1.0 / 255.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "0-255" => Some(InputScale::Raw),
            "unit" | "0-1" => Some(InputScale::Unit),
            _ => None,
        }
    }
}

impl std::fmt::Display for InputScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputScale::Raw => f.write_str("raw"),
            InputScale::Unit => f.write_str("unit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(f: ResizeFilter) -> Self {
        match f {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerCfg {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), body_limit_bytes: default_body_limit() }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelCfg {
    pub backend: String,
    #[serde(default = "default_device")]
    pub device: String,
    pub model_path: String,
    pub height: usize,
    pub width: usize,
    pub input_scale: InputScale,
    #[serde(default)]
    pub center_crop: bool,
    #[serde(default)]
    pub resize_filter: ResizeFilter,

    /// Falls back to the artifact's first input/output when unset.
    #[serde(default)]
    pub input_name: Option<String>,
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub intra_threads: Option<usize>,
}

fn default_device() -> String {
    "cpu".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyCfg {
    /// Minimum top-class confidence, in percent.
    pub threshold: f64,
    #[serde(default = "default_true")]
    pub include_top3: bool,
    #[serde(default)]
    pub include_all_predictions: bool,
    /// Rank the top 3 for Unknown outcomes too instead of returning an empty list.
    #[serde(default)]
    pub rank_unknown: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyCfg {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerCfg,
    pub model: ModelCfg,
    pub policy: PolicyCfg,
    pub taxonomy: TaxonomyCfg,
}

impl Config {
    /// Reads and validates a TOML config. Relative paths inside it resolve against
    /// the file's own directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let mut cfg: Config =
            toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if cfg.taxonomy.path.is_relative() {
            cfg.taxonomy.path = base.join(&cfg.taxonomy.path);
        }
        let model_path = Path::new(&cfg.model.model_path);
        if model_path.is_relative() {
            cfg.model.model_path = base.join(model_path).to_string_lossy().into_owned();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.model.height > 0 && self.model.width > 0,
            "model.height and model.width must be non-zero"
        );
        anyhow::ensure!(
            (0.0..=100.0).contains(&self.policy.threshold),
            "policy.threshold must be within 0..=100, got {}",
            self.policy.threshold
        );
        anyhow::ensure!(
            matches!(self.model.device.as_str(), "cpu" | "gpu"),
            "model.device must be \"cpu\" or \"gpu\", got {:?}",
            self.model.device
        );
        anyhow::ensure!(self.server.body_limit_bytes > 0, "server.body_limit_bytes must be non-zero");
        Ok(())
    }

    pub fn input_spec(&self) -> InputSpec {
        InputSpec::new(self.model.height, self.model.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [model]
        backend = "onnx"
        model_path = "models/trash.onnx"
        height = 224
        width = 224
        input_scale = "raw"

        [policy]
        threshold = 50.0

        [taxonomy]
        path = "taxonomy.toml"
    "#;

    #[test]
    fn test_defaults_applied() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.model.device, "cpu");
        assert!(!cfg.model.center_crop);
        assert_eq!(cfg.model.resize_filter, ResizeFilter::CatmullRom);
        assert!(cfg.policy.include_top3);
        assert!(!cfg.policy.include_all_predictions);
        assert_eq!(cfg.input_spec().shape(), [1, 224, 224, 3]);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.policy.threshold = 120.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_input_scale_rejected() {
        let bad = SAMPLE.replace("\"raw\"", "\"imagenet\"");
        assert!(toml::from_str::<Config>(&bad).is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.taxonomy.path, dir.path().join("taxonomy.toml"));
        assert!(Path::new(&cfg.model.model_path).starts_with(dir.path()));
    }

    #[test]
    fn test_input_spec_validate() {
        let spec = InputSpec::new(300, 300);
        assert!(spec.validate(&[1, 300, 300, 3]).is_ok());
        assert!(spec.validate(&[1, 3, 300, 300]).is_err());
        assert!(spec.validate(&[2, 300, 300, 3]).is_err());
        assert!(spec.validate(&[300, 300, 3]).is_err());
    }

    #[test]
    fn test_input_scale_parse() {
        assert_eq!(InputScale::parse("RAW"), Some(InputScale::Raw));
        assert_eq!(InputScale::parse("0-1"), Some(InputScale::Unit));
        assert_eq!(InputScale::parse("whatever"), None);
    }
}
