//! Per-run training state

use serde::{Deserialize, Serialize};

/// Per-epoch history arrays, one entry per completed epoch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub train_loss: Vec<f32>,
    pub valid_loss: Vec<f32>,
    pub train_acc: Vec<f32>,
    pub valid_acc: Vec<f32>,
    pub lr: Vec<f32>,
}

impl History {
    /// Number of recorded epochs
    pub fn len(&self) -> usize {
        self.valid_loss.len()
    }

    /// Whether any epoch has been recorded
    pub fn is_empty(&self) -> bool {
        self.valid_loss.is_empty()
    }
}

/// JSON has no representation for f32 infinities, and a fresh state's
/// best loss is one: map non-finite to null on the wire and back.
pub(crate) mod non_finite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::INFINITY))
    }
}

/// Mutable state owned exclusively by one training run.
///
/// Invariant: `best_valid_loss == min(history.valid_loss)` once any epoch
/// has been recorded and observed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Completed epoch count (also the next epoch index to run)
    pub epoch: usize,
    /// Best validation loss seen so far
    #[serde(with = "non_finite_as_null")]
    pub best_valid_loss: f32,
    /// Consecutive epochs without strict validation-loss improvement
    pub epochs_since_improvement: usize,
    /// Per-epoch metric history
    pub history: History,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingState {
    /// Fresh state at epoch zero
    pub fn new() -> Self {
        Self {
            epoch: 0,
            best_valid_loss: f32::INFINITY,
            epochs_since_improvement: 0,
            history: History::default(),
        }
    }

    /// Append one epoch's metrics to the history
    pub fn record_epoch(
        &mut self,
        train_loss: f32,
        train_acc: f32,
        valid_loss: f32,
        valid_acc: f32,
        lr: f32,
    ) {
        self.history.train_loss.push(train_loss);
        self.history.train_acc.push(train_acc);
        self.history.valid_loss.push(valid_loss);
        self.history.valid_acc.push(valid_acc);
        self.history.lr.push(lr);
    }

    /// Strict improvement test for the just-recorded validation loss.
    ///
    /// On improvement the no-improvement counter resets to zero and the
    /// best loss updates; otherwise the counter increments.
    pub fn observe(&mut self, valid_loss: f32) -> bool {
        if valid_loss < self.best_valid_loss {
            self.best_valid_loss = valid_loss;
            self.epochs_since_improvement = 0;
            true
        } else {
            self.epochs_since_improvement += 1;
            false
        }
    }
}
