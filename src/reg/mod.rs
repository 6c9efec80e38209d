//! Activation-sparsity regularizer strategies
//!
//! Each strategy reduces the tapped activations of one forward pass to a
//! single non-negative scalar penalty. The penalty tensor carries its own
//! analytic backward; the training engine scales it by α and adds it to the
//! task loss. Adding a new strategy means adding one implementer of
//! [`Regularizer`], not editing a dispatch function.

mod distance;
mod hoyer;
mod l1;
mod transformed_l1;

pub use distance::SourceDistance;
pub use hoyer::HoyerSquare;
pub use l1::L1Penalty;
pub use transformed_l1::TransformedL1;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

use crate::autograd::{BackwardOp, Tensor};
use crate::error::{Error, Result};
use crate::instrument::ActivationSnapshot;

/// A penalty computed from the activations of one forward pass
pub trait Regularizer: std::fmt::Debug {
    /// Unscaled, non-negative scalar penalty with backward attached.
    ///
    /// An empty snapshot yields exactly zero with no gradient.
    fn penalty(&self, taps: &ActivationSnapshot) -> Tensor;

    /// Strategy name for logs and reports
    fn name(&self) -> &'static str;
}

/// Immutable regularizer selection: strategy kind, strength α, and the
/// shape parameter β required by `transformed_l1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegularizerConfig {
    /// Strategy kind: `l1`, `hoyer_square`, or `transformed_l1`
    pub kind: String,
    /// Strength coefficient applied to the penalty
    pub alpha: f64,
    /// Shape parameter, required for `transformed_l1` only
    pub beta: Option<f64>,
}

impl Default for RegularizerConfig {
    fn default() -> Self {
        Self { kind: "l1".to_string(), alpha: 0.0, beta: None }
    }
}

impl RegularizerConfig {
    /// Build the selected strategy.
    ///
    /// Unrecognized kinds and a missing β fail fast with [`Error::Config`];
    /// there is no silent fallback.
    pub fn build(&self) -> Result<Box<dyn Regularizer>> {
        match self.kind.as_str() {
            "l1" => Ok(Box::new(L1Penalty)),
            "hoyer_square" => Ok(Box::new(HoyerSquare::new())),
            "transformed_l1" => {
                let beta = self.beta.ok_or_else(|| {
                    Error::Config("transformed_l1 requires a beta shape parameter".to_string())
                })?;
                if beta <= 0.0 || !beta.is_finite() {
                    return Err(Error::Config(format!("beta must be positive, got {beta}")));
                }
                Ok(Box::new(TransformedL1::new(beta as f32)))
            }
            other => Err(Error::Config(format!("unrecognized regularizer kind '{other}'"))),
        }
    }
}

/// Build the scalar penalty tensor for a strategy.
///
/// `staged` pairs each tapped tensor with the penalty's gradient with
/// respect to it. Backward multiplies by the incoming scalar gradient and
/// accumulates into the tap's grad cell WITHOUT recursing: the task-loss
/// branch of the composed loss walks the graph afterwards and carries the
/// staged contribution the rest of the way (see `TrainLoop::compose_loss`).
pub(crate) fn penalty_tensor(value: f32, staged: Vec<(Tensor, Array1<f32>)>) -> Tensor {
    let requires_grad = staged.iter().any(|(t, _)| t.requires_grad());
    let mut result = Tensor::from_vec(vec![value], requires_grad);

    if requires_grad {
        let backward_op = Rc::new(StagedPenaltyBackward {
            staged,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct StagedPenaltyBackward {
    staged: Vec<(Tensor, Array1<f32>)>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for StagedPenaltyBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let scale = grad[0];
            for (tensor, g) in &self.staged {
                if tensor.requires_grad() {
                    tensor.accumulate_grad(g * scale);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::autograd::Tensor;
    use crate::instrument::TapRegistry;

    /// Snapshot with the given per-layer values, one row each
    pub fn snapshot_of(layers: &[(&str, Vec<f32>)]) -> crate::instrument::ActivationSnapshot {
        let taps = TapRegistry::new();
        for (name, values) in layers {
            taps.record(name, Tensor::from_vec(values.clone(), true), 1);
        }
        taps.snapshot()
    }

    /// Snapshot with explicit row counts
    pub fn snapshot_with_rows(
        layers: &[(&str, Vec<f32>, usize)],
    ) -> crate::instrument::ActivationSnapshot {
        let taps = TapRegistry::new();
        for (name, values, rows) in layers {
            taps.record(name, Tensor::from_vec(values.clone(), true), *rows);
        }
        taps.snapshot()
    }
}
