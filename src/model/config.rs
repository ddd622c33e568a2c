//! Experiment Configuration Module
//!
//! Serializable configuration for a complete run: which algorithm, its
//! hyperparameters, the optimisation settings and the synthetic data used
//! by the demo. Every struct validates itself and reports the offending
//! parameter by name.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::toy::ToyDataConfig;
use crate::ssl::align::DEFAULT_ALIGN_EPSILON;
use crate::ssl::self_transform::SelfTransformKind;
use crate::ssl::sharpen::validate_temperature;
use crate::ssl::warmup::WarmupUnit;
use crate::training::accumulation::AccumulationPolicy;
use crate::training::hooks::MetricMode;
use crate::training::loss::LossKind;
use crate::training::remixmatch::AlignOrder;
use crate::training::scheduler::LRScheduler;
use crate::utils::error::{Result, SslError};
use crate::utils::metrics::TargetKind;

/// Semi-supervised algorithm to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AlgorithmKind {
    #[default]
    #[serde(rename = "mixmatch")]
    MixMatch,
    #[serde(rename = "remixmatch")]
    ReMixMatch,
}

impl std::str::FromStr for AlgorithmKind {
    type Err = SslError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mixmatch" | "mm" => Ok(AlgorithmKind::MixMatch),
            "remixmatch" | "rmm" => Ok(AlgorithmKind::ReMixMatch),
            other => Err(SslError::config(
                "algorithm",
                format!("unknown algorithm '{}' (expected mixmatch or remixmatch)", other),
            )),
        }
    }
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlgorithmKind::MixMatch => write!(f, "MixMatch"),
            AlgorithmKind::ReMixMatch => write!(f, "ReMixMatch"),
        }
    }
}

/// Optimizer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

/// Warmup of the unsupervised loss weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupConfig {
    /// Warmup length in `unit`s
    pub n_steps: usize,
    /// When set, overrides `n_steps` with this fraction of the whole run
    pub ratio: Option<f64>,
    /// Whether a step is one iteration or one epoch
    pub unit: WarmupUnit,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            n_steps: 16000,
            ratio: None,
            unit: WarmupUnit::Iteration,
        }
    }
}

impl WarmupConfig {
    /// Warmup length for a run of `epochs` epochs of `steps_per_epoch` steps
    pub fn resolve_steps(&self, steps_per_epoch: usize, epochs: usize) -> usize {
        let total = match self.unit {
            WarmupUnit::Iteration => steps_per_epoch * epochs,
            WarmupUnit::Epoch => epochs,
        };

        match self.ratio {
            Some(ratio) => (ratio * total as f64).round() as usize,
            None => self.n_steps,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ratio) = self.ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(SslError::config(
                    "warmup.ratio",
                    format!("must be in [0, 1], got {}", ratio),
                ));
            }
        }
        Ok(())
    }
}

/// MixMatch hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixMatchConfig {
    /// Sharpening temperature
    pub temperature: f64,
    /// Beta(alpha, alpha) parameter of MixUp
    pub alpha: f64,
    /// Fold the MixUp coefficient to max(lambda, 1 - lambda)
    pub apply_max: bool,
    /// Weight of the supervised loss
    pub lambda_s: f64,
    /// Target weight of the unsupervised loss, reached after warmup
    pub lambda_u: f64,
    /// Number of unlabeled views per step (K), or strong views for ReMixMatch
    pub n_augms: usize,
    /// Criterion of the supervised term
    pub criterion_s: LossKind,
    /// Criterion of the unsupervised term
    pub criterion_u: LossKind,
    /// Kind of targets, drives activation and metrics
    pub target_kind: TargetKind,
    pub warmup: WarmupConfig,
}

impl Default for MixMatchConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            alpha: 0.75,
            apply_max: true,
            lambda_s: 1.0,
            lambda_u: 1.0,
            n_augms: 2,
            criterion_s: LossKind::CrossEntropy,
            criterion_u: LossKind::CrossEntropy,
            target_kind: TargetKind::MultiClass,
            warmup: WarmupConfig::default(),
        }
    }
}

impl MixMatchConfig {
    /// ReMixMatch defaults for the shared hyperparameters
    pub fn remixmatch_defaults() -> Self {
        Self {
            lambda_u: 1.5,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_temperature(self.temperature)?;

        if !self.alpha.is_finite() || self.alpha <= 0.0 {
            return Err(SslError::config(
                "alpha",
                format!("must be a finite value > 0, got {}", self.alpha),
            ));
        }
        check_weight("lambda_s", self.lambda_s)?;
        check_weight("lambda_u", self.lambda_u)?;

        if self.n_augms == 0 {
            return Err(SslError::config("n_augms", "must be at least 1"));
        }

        self.warmup.validate()
    }
}

/// ReMixMatch hyperparameters on top of the shared MixMatch ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReMixMatchConfig {
    pub base: MixMatchConfig,
    /// Weight of the loss on the raw strongly-augmented view
    pub lambda_u1: f64,
    /// Weight of the self-supervised transform loss
    pub lambda_r: f64,
    /// Capacity of the distribution alignment windows
    pub history: usize,
    pub align_order: AlignOrder,
    pub align_epsilon: f64,
    pub self_transform: SelfTransformKind,
}

impl Default for ReMixMatchConfig {
    fn default() -> Self {
        Self {
            base: MixMatchConfig::remixmatch_defaults(),
            lambda_u1: 0.5,
            lambda_r: 0.5,
            history: 128,
            align_order: AlignOrder::AlignThenSharpen,
            align_epsilon: DEFAULT_ALIGN_EPSILON,
            self_transform: SelfTransformKind::Rotation,
        }
    }
}

impl ReMixMatchConfig {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        check_weight("lambda_u1", self.lambda_u1)?;
        check_weight("lambda_r", self.lambda_r)?;

        if self.history == 0 {
            return Err(SslError::config("history", "must be at least 1"));
        }
        if !self.align_epsilon.is_finite() || self.align_epsilon <= 0.0 {
            return Err(SslError::config(
                "align_epsilon",
                format!("must be a finite value > 0, got {}", self.align_epsilon),
            ));
        }
        Ok(())
    }
}

/// Optimisation settings shared by both algorithms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub weight_decay: f64,
    /// Seed of the host-side generator and of the backend
    pub seed: u64,
    pub accumulation: AccumulationPolicy,
    /// Optional schedule applied as the first post-epoch hook
    pub lr_scheduler: Option<LRScheduler>,
    /// Metric whose best value triggers a checkpoint
    pub checkpoint_metric: Option<String>,
    pub checkpoint_mode: MetricMode,
    pub early_stopping_patience: Option<usize>,
    /// Log step losses every N steps at debug level
    pub log_interval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            learning_rate: 1e-3,
            optimizer: OptimizerKind::Adam,
            weight_decay: 0.0,
            seed: 1234,
            accumulation: AccumulationPolicy::every_step(),
            lr_scheduler: None,
            checkpoint_metric: Some("val/acc".to_string()),
            checkpoint_mode: MetricMode::Max,
            early_stopping_patience: None,
            log_interval: 10,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(SslError::config("epochs", "must be at least 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(SslError::config(
                "learning_rate",
                format!("must be a finite value > 0, got {}", self.learning_rate),
            ));
        }
        check_weight("weight_decay", self.weight_decay)?;
        if self.log_interval == 0 {
            return Err(SslError::config("log_interval", "must be at least 1"));
        }
        if self.early_stopping_patience == Some(0) {
            return Err(SslError::config("early_stopping_patience", "must be at least 1"));
        }
        self.accumulation.validate()
    }
}

/// Everything needed to reproduce a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub algorithm: AlgorithmKind,
    pub training: TrainingConfig,
    pub mixmatch: MixMatchConfig,
    pub remixmatch: ReMixMatchConfig,
    pub data: ToyDataConfig,
    /// Hidden width of the demo classifier
    pub hidden_size: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::MixMatch,
            training: TrainingConfig::default(),
            mixmatch: MixMatchConfig::default(),
            remixmatch: ReMixMatchConfig::default(),
            data: ToyDataConfig::default(),
            hidden_size: 64,
        }
    }
}

impl ExperimentConfig {
    /// Settings sized for the synthetic dataset: short run, warmup over the first third
    pub fn toy(algorithm: AlgorithmKind) -> Self {
        let warmup = WarmupConfig {
            ratio: Some(0.3),
            ..Default::default()
        };

        let mut config = Self {
            algorithm,
            ..Default::default()
        };
        config.training.epochs = 8;
        config.training.learning_rate = 3e-3;
        config.training.lr_scheduler = Some(LRScheduler::soft_cosine(3e-3, 8));
        config.mixmatch.warmup = warmup.clone();
        config.remixmatch.base.warmup = warmup;
        config
    }

    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.data.validate()?;
        if self.hidden_size == 0 {
            return Err(SslError::config("hidden_size", "must be at least 1"));
        }

        match self.algorithm {
            AlgorithmKind::MixMatch => self.mixmatch.validate(),
            AlgorithmKind::ReMixMatch => self.remixmatch.validate(),
        }
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SslError::PathNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn check_weight(param: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SslError::config(
            param,
            format!("must be a finite value >= 0, got {}", value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MixMatchConfig::default().validate().is_ok());
        assert!(ReMixMatchConfig::default().validate().is_ok());
        assert!(TrainingConfig::default().validate().is_ok());
        assert!(ExperimentConfig::toy(AlgorithmKind::MixMatch).validate().is_ok());
        assert!(ExperimentConfig::toy(AlgorithmKind::ReMixMatch).validate().is_ok());
    }

    #[test]
    fn test_remixmatch_defaults() {
        let config = ReMixMatchConfig::default();
        assert_eq!(config.base.lambda_u, 1.5);
        assert_eq!(config.lambda_u1, 0.5);
        assert_eq!(config.lambda_r, 0.5);
        assert_eq!(config.history, 128);
    }

    #[test]
    fn test_errors_name_the_parameter() {
        let config = MixMatchConfig {
            temperature: 0.0,
            ..Default::default()
        };
        assert!(format!("{}", config.validate().unwrap_err()).contains("temperature"));

        let config = MixMatchConfig {
            alpha: -1.0,
            ..Default::default()
        };
        assert!(format!("{}", config.validate().unwrap_err()).contains("alpha"));

        let config = ReMixMatchConfig {
            history: 0,
            ..Default::default()
        };
        assert!(format!("{}", config.validate().unwrap_err()).contains("history"));

        let config = TrainingConfig {
            learning_rate: f64::NAN,
            ..Default::default()
        };
        assert!(format!("{}", config.validate().unwrap_err()).contains("learning_rate"));
    }

    #[test]
    fn test_warmup_resolution() {
        let fixed = WarmupConfig {
            n_steps: 50,
            ratio: None,
            unit: WarmupUnit::Iteration,
        };
        assert_eq!(fixed.resolve_steps(10, 8), 50);

        let ratio = WarmupConfig {
            n_steps: 50,
            ratio: Some(0.25),
            unit: WarmupUnit::Iteration,
        };
        assert_eq!(ratio.resolve_steps(10, 8), 20);

        let per_epoch = WarmupConfig {
            n_steps: 0,
            ratio: Some(0.5),
            unit: WarmupUnit::Epoch,
        };
        assert_eq!(per_epoch.resolve_steps(10, 8), 4);
    }

    #[test]
    fn test_unknown_loss_name_in_json_is_rejected() {
        let mut value = serde_json::to_value(MixMatchConfig::default()).unwrap();
        value["criterion_u"] = serde_json::Value::String("hinge".to_string());
        assert!(serde_json::from_value::<MixMatchConfig>(value).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let config = ExperimentConfig::toy(AlgorithmKind::ReMixMatch);

        config.save(&path).unwrap();
        let loaded = ExperimentConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("ReMixMatch".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::ReMixMatch);
        assert!("fixmatch".parse::<AlgorithmKind>().is_err());
    }
}
