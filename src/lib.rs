//! Resumable sparsity-regularized fine-tuning experiments
//!
//! afinar runs image-classification fine-tuning experiments that sweep
//! activation-sparsity regularizers and hyperparameters. The core is an
//! experiment-orchestration loop built to survive process restarts:
//!
//! - [`instrument`]: activation tapping through an observer registry
//! - [`reg`]: pluggable penalty strategies (L1, Hoyer-square,
//!   Transformed-L1) plus distance-from-source regularization
//! - [`train`]: the resumable train/validate epoch cycle with plateau LR
//!   decay and early stopping
//! - [`checkpoint`]: atomic latest/best checkpoints and idempotent resume
//! - [`search`]: sequential model-based (TPE) hyperparameter search with
//!   a crash-safe trial log
//! - [`eval`]: metrics reporting, including MC-dropout predictive
//!   uncertainty
//!
//! Model architectures and dataset pipelines are collaborators behind the
//! [`model::Network`] and [`train::BatchSource`] seams.
//!
//! # Example
//!
//! ```
//! use afinar::checkpoint::CheckpointManager;
//! use afinar::config::ExperimentConfig;
//! use afinar::model::SparseMlp;
//! use afinar::train::{InMemorySource, TrainLoop};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = ExperimentConfig {
//!     checkpoint_dir: dir.path().to_path_buf(),
//!     max_epochs: 3,
//!     dropout_rate: 0.0,
//!     ..Default::default()
//! };
//!
//! let rows = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
//! let labels = vec![0, 1];
//! let mut train = InMemorySource::from_rows(&rows, &labels, 2, 2).unwrap();
//! let mut valid = InMemorySource::from_rows(&rows, &labels, 2, 2).unwrap();
//!
//! let mut model = SparseMlp::new(&[2, 8, 2], config.dropout_rate, config.seed).unwrap();
//! let mut engine =
//!     TrainLoop::new(&mut model, &config, CheckpointManager::new(dir.path())).unwrap();
//! let outcome = engine.run(&mut train, &mut valid);
//! assert!(outcome.best_valid_loss.is_finite());
//! ```

pub mod autograd;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod eval;
pub mod instrument;
pub mod model;
pub mod optim;
pub mod reg;
pub mod search;
pub mod train;

pub use autograd::Tensor;
pub use config::ExperimentConfig;
pub use error::{Error, Result};
