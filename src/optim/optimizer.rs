//! Optimizer trait

use serde::{Deserialize, Serialize};

use crate::autograd::Tensor;
use crate::error::Result;

/// Serializable optimizer snapshot for checkpoint/resume.
///
/// `velocities` holds one slot per parameter; an empty vec means the slot
/// has not been initialized yet.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub lr: f32,
    pub velocities: Vec<Vec<f32>>,
}

/// Trait for optimization algorithms
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [Tensor]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Snapshot internal state for a checkpoint
    fn state(&self) -> OptimizerState;

    /// Restore internal state from a checkpoint
    fn load_state(&mut self, state: OptimizerState) -> Result<()>;
}
