//! Plateau-triggered learning rate decay

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Optimizer;

/// Serializable scheduler snapshot for checkpoint/resume
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlateauState {
    #[serde(with = "crate::train::non_finite_as_null")]
    pub best: f32,
    pub bad_epochs: usize,
}

/// Reduce-on-plateau scheduler.
///
/// Multiplies the learning rate by `factor` once the monitored validation
/// loss has gone `patience` consecutive epochs without strict improvement,
/// flooring the rate at `min_lr`. The plateau counter resets after each
/// reduction and after each improvement.
#[derive(Clone, Debug)]
pub struct ReduceLrOnPlateau {
    factor: f32,
    patience: usize,
    min_lr: f32,
    best: f32,
    bad_epochs: usize,
}

impl ReduceLrOnPlateau {
    /// Create a scheduler; `factor` must be in (0, 1).
    pub fn new(factor: f32, patience: usize, min_lr: f32) -> Self {
        Self { factor, patience, min_lr, best: f32::INFINITY, bad_epochs: 0 }
    }

    /// Observe one epoch's validation loss and decay the rate if plateaued
    pub fn step(&mut self, valid_loss: f32, optimizer: &mut dyn Optimizer) {
        if valid_loss < self.best {
            self.best = valid_loss;
            self.bad_epochs = 0;
            return;
        }

        self.bad_epochs += 1;
        if self.bad_epochs >= self.patience {
            self.bad_epochs = 0;
            let lr = optimizer.lr();
            let reduced = (lr * self.factor).max(self.min_lr);
            if reduced < lr {
                info!(old_lr = lr, new_lr = reduced, "validation plateau, reducing learning rate");
                optimizer.set_lr(reduced);
            }
        }
    }

    /// Snapshot for a checkpoint
    pub fn state(&self) -> PlateauState {
        PlateauState { best: self.best, bad_epochs: self.bad_epochs }
    }

    /// Restore from a checkpoint
    pub fn load_state(&mut self, state: PlateauState) {
        self.best = state.best;
        self.bad_epochs = state.bad_epochs;
    }
}
