//! Experiment configuration
//!
//! One immutable struct passed by reference into each component at
//! construction. There is no process-wide configuration state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::reg::RegularizerConfig;

/// Configuration for one experiment (a training run or a search sweep).
///
/// # Example
///
/// ```
/// use afinar::config::ExperimentConfig;
///
/// let config = ExperimentConfig::default().with_max_epochs(50);
/// assert_eq!(config.lr_factor, 0.25);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Directory for latest/best checkpoints
    pub checkpoint_dir: PathBuf,

    /// Directory for search and sweep result files
    pub results_dir: PathBuf,

    /// Epoch budget per training run
    pub max_epochs: usize,

    /// Mini-batch size used by the binary's dataset loader
    pub batch_size: usize,

    /// Initial learning rate
    pub lr: f32,

    /// SGD momentum
    pub momentum: f32,

    /// Multiplicative LR decay applied after a validation-loss plateau
    pub lr_factor: f32,

    /// Plateau length (epochs without improvement) before an LR decay
    pub lr_patience: usize,

    /// Floor below which the learning rate is never reduced
    pub min_lr: f32,

    /// Epochs without validation-loss improvement before early stop
    pub es_patience: usize,

    /// Save a "latest" checkpoint every this many epochs
    pub checkpoint_interval: usize,

    /// Dropout rate of the model under training
    pub dropout_rate: f32,

    /// Hidden layer widths of the binary's stand-in model
    pub hidden: Vec<usize>,

    /// Seed for parameter init, dropout, and search sampling
    pub seed: u64,

    /// Activation regularizer selection
    pub regularizer: RegularizerConfig,

    /// Strength of the distance-from-source penalty (0 disables it)
    pub source_strength: f32,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            results_dir: PathBuf::from("results"),
            max_epochs: 100,
            batch_size: 32,
            lr: 0.01,
            momentum: 0.9,
            lr_factor: 0.25,
            lr_patience: 3,
            min_lr: 1e-5,
            es_patience: 7,
            checkpoint_interval: 5,
            dropout_rate: 0.2,
            hidden: vec![128],
            seed: 42,
            regularizer: RegularizerConfig::default(),
            source_strength: 0.0,
        }
    }
}

impl ExperimentConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("bad config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the epoch budget
    pub fn with_max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = epochs;
        self
    }

    /// Set the checkpoint directory
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Check bounds that would otherwise fail deep inside a run
    pub fn validate(&self) -> Result<()> {
        if self.max_epochs == 0 {
            return Err(Error::Config("max_epochs must be positive".into()));
        }
        if self.lr <= 0.0 || !self.lr.is_finite() {
            return Err(Error::Config(format!("lr must be positive, got {}", self.lr)));
        }
        if !(0.0..1.0).contains(&self.lr_factor) || self.lr_factor <= 0.0 {
            return Err(Error::Config(format!(
                "lr_factor must be in (0, 1), got {}",
                self.lr_factor
            )));
        }
        if self.es_patience == 0 {
            return Err(Error::Config("es_patience must be positive".into()));
        }
        if self.lr_patience == 0 {
            return Err(Error::Config("lr_patience must be positive".into()));
        }
        if self.checkpoint_interval == 0 {
            return Err(Error::Config("checkpoint_interval must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(Error::Config(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        if self.source_strength < 0.0 {
            return Err(Error::Config("source_strength must be non-negative".into()));
        }
        Ok(())
    }
}
