//! Model seam
//!
//! The experiment core drives any classifier through the [`Network`] trait;
//! the concrete architecture is a collaborator. [`SparseMlp`] is the
//! in-crate implementation used by the binary and the tests.

mod mlp;

pub use mlp::SparseMlp;

use serde::{Deserialize, Serialize};

use crate::autograd::Tensor;
use crate::error::Result;
use crate::instrument::ActivationSnapshot;

/// How a forward pass should treat stochastic layers.
///
/// `Stochastic` keeps dropout active while parameters and any frozen
/// statistics stay fixed; the mode used for repeated-inference
/// uncertainty estimation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForwardMode {
    Train,
    Eval,
    Stochastic,
}

impl ForwardMode {
    /// Whether dropout masks are sampled in this mode
    pub fn stochastic(self) -> bool {
        matches!(self, ForwardMode::Train | ForwardMode::Stochastic)
    }
}

/// Named parameter blob used for checkpoints and pretrained references
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub tensors: Vec<(String, Vec<f32>)>,
}

impl ModelState {
    /// Look up a tensor by name
    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.tensors.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }

    /// Total number of scalar parameters
    pub fn n_parameters(&self) -> usize {
        self.tensors.iter().map(|(_, v)| v.len()).sum()
    }
}

/// A classifier the training engine and evaluator can drive
pub trait Network {
    /// Run one forward pass over `rows` stacked inputs, returning logits
    /// (`rows * n_classes`, row-major). Replaces the activation snapshot.
    fn forward(&mut self, inputs: &Tensor, rows: usize, mode: ForwardMode) -> Tensor;

    /// Activations tapped during the most recent forward pass
    fn taps(&self) -> ActivationSnapshot;

    /// Trainable parameter handles
    fn params(&self) -> Vec<Tensor>;

    /// Parameter handles with their stable names
    fn named_params(&self) -> Vec<(String, Tensor)>;

    /// Serializable snapshot of all parameters
    fn state(&self) -> ModelState;

    /// Restore parameters from a snapshot; names and shapes must match
    fn load_state(&mut self, state: &ModelState) -> Result<()>;

    /// Number of output classes
    fn n_classes(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_mode_stochastic_flag() {
        assert!(ForwardMode::Train.stochastic());
        assert!(ForwardMode::Stochastic.stochastic());
        assert!(!ForwardMode::Eval.stochastic());
    }

    #[test]
    fn test_model_state_lookup() {
        let state = ModelState {
            tensors: vec![
                ("w".to_string(), vec![1.0, 2.0]),
                ("b".to_string(), vec![0.5]),
            ],
        };
        assert_eq!(state.get("b"), Some(&[0.5][..]));
        assert!(state.get("missing").is_none());
        assert_eq!(state.n_parameters(), 3);
    }
}
