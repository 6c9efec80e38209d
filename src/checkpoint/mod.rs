//! Checkpoint persistence and idempotent resume
//!
//! Two kinds of durable snapshots: a "latest" checkpoint overwritten
//! periodically for crash/resume, and a lighter "best" checkpoint
//! overwritten only on validation-loss improvement for final evaluation.
//! All writes go to a temp path and are renamed into place, so a reader
//! never observes a partially written file.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::ModelState;
use crate::optim::{OptimizerState, PlateauState};
use crate::train::TrainingState;

/// Full resume snapshot: everything needed to continue a run as if the
/// process had never stopped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LatestCheckpoint {
    pub epoch: usize,
    pub model: ModelState,
    pub optimizer: OptimizerState,
    pub scheduler: PlateauState,
    pub state: TrainingState,
    pub saved_at: String,
}

impl LatestCheckpoint {
    pub fn new(
        model: ModelState,
        optimizer: OptimizerState,
        scheduler: PlateauState,
        state: TrainingState,
    ) -> Self {
        Self {
            epoch: state.epoch,
            model,
            optimizer,
            scheduler,
            state,
            saved_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Light snapshot of the best model seen in a run, with the architecture
/// fields needed to rebuild it exactly at evaluation time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BestCheckpoint {
    pub model: ModelState,
    pub valid_loss: f32,
    pub dropout_rate: f32,
    pub alpha: f64,
    pub saved_at: String,
}

impl BestCheckpoint {
    pub fn new(model: ModelState, valid_loss: f32, dropout_rate: f32, alpha: f64) -> Self {
        Self { model, valid_loss, dropout_rate, alpha, saved_at: Utc::now().to_rfc3339() }
    }
}

/// Outcome of probing for a resumable checkpoint. Absence is the normal
/// fresh-start path, not an error.
#[derive(Debug)]
pub enum Resume {
    Fresh,
    Restored(Box<LatestCheckpoint>),
}

/// Manages the latest/best checkpoint pair of one run directory
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the resume checkpoint
    pub fn latest_path(&self) -> PathBuf {
        self.dir.join("checkpoint_latest.json")
    }

    /// Path of the best-model checkpoint
    pub fn best_path(&self) -> PathBuf {
        self.dir.join("checkpoint_best.json")
    }

    /// Overwrite the latest checkpoint
    pub fn save_latest(&self, checkpoint: &LatestCheckpoint) -> Result<()> {
        self.write_atomic(&self.latest_path(), checkpoint)?;
        debug!(epoch = checkpoint.epoch, "saved latest checkpoint");
        Ok(())
    }

    /// Overwrite the best checkpoint.
    ///
    /// The recorded validation loss is kept monotonically non-increasing:
    /// a candidate worse than what is already on disk is ignored.
    pub fn save_best(&self, checkpoint: &BestCheckpoint) -> Result<()> {
        if let Ok(existing) = self.load_best() {
            if checkpoint.valid_loss > existing.valid_loss {
                debug!(
                    candidate = checkpoint.valid_loss,
                    existing = existing.valid_loss,
                    "skipping best-checkpoint overwrite with worse loss"
                );
                return Ok(());
            }
        }
        self.write_atomic(&self.best_path(), checkpoint)?;
        info!(valid_loss = checkpoint.valid_loss, "saved best checkpoint");
        Ok(())
    }

    /// Probe for a latest checkpoint; `Fresh` when the file does not exist
    pub fn load_if_present(&self) -> Result<Resume> {
        let path = self.latest_path();
        if !path.exists() {
            return Ok(Resume::Fresh);
        }
        let checkpoint: LatestCheckpoint = Self::read_json(&path)?;
        Ok(Resume::Restored(Box::new(checkpoint)))
    }

    /// Load the best checkpoint; absence is an error for evaluation
    pub fn load_best(&self) -> Result<BestCheckpoint> {
        let path = self.best_path();
        if !path.exists() {
            return Err(Error::MissingCheckpoint(path));
        }
        Self::read_json(&path)
    }

    fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string(value)
            .map_err(|e| Error::Serialization(format!("checkpoint encode failed: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Serialization(format!("checkpoint decode failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn latest_at_epoch(epoch: usize) -> LatestCheckpoint {
        let mut state = TrainingState::new();
        state.epoch = epoch;
        LatestCheckpoint::new(
            ModelState::default(),
            OptimizerState { lr: 0.01, velocities: vec![] },
            PlateauState { best: 1.0, bad_epochs: 0 },
            state,
        )
    }

    #[test]
    fn test_fresh_when_absent() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        assert!(matches!(manager.load_if_present().unwrap(), Resume::Fresh));
    }

    #[test]
    fn test_latest_roundtrip() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());

        manager.save_latest(&latest_at_epoch(7)).unwrap();
        match manager.load_if_present().unwrap() {
            Resume::Restored(ck) => {
                assert_eq!(ck.epoch, 7);
                assert_eq!(ck.state.epoch, 7);
                assert_eq!(ck.optimizer.lr, 0.01);
            }
            Resume::Fresh => panic!("expected restored checkpoint"),
        }
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        manager.save_latest(&latest_at_epoch(1)).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_missing_best_is_error() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        assert!(matches!(manager.load_best(), Err(Error::MissingCheckpoint(_))));
    }

    #[test]
    fn test_best_monotonic_non_increasing() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());

        for &loss in &[0.9f32, 0.5, 0.7, 0.4, 0.6] {
            manager
                .save_best(&BestCheckpoint::new(ModelState::default(), loss, 0.2, 0.01))
                .unwrap();
            let on_disk = manager.load_best().unwrap().valid_loss;
            // Never increases across overwrites
            assert!(on_disk <= loss);
        }
        assert_eq!(manager.load_best().unwrap().valid_loss, 0.4);
    }

    #[test]
    fn test_best_keeps_architecture_fields() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());

        manager
            .save_best(&BestCheckpoint::new(ModelState::default(), 0.3, 0.5, 0.001))
            .unwrap();
        let best = manager.load_best().unwrap();
        assert_eq!(best.dropout_rate, 0.5);
        assert_eq!(best.alpha, 0.001);
    }

    #[test]
    fn test_corrupted_latest_is_an_error() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        std::fs::write(manager.latest_path(), "{truncated").unwrap();
        assert!(matches!(manager.load_if_present(), Err(Error::Serialization(_))));
    }
}
