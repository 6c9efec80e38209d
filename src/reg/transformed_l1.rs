//! Transformed-L1 penalty

use ndarray::Array1;

use crate::autograd::Tensor;
use crate::instrument::ActivationSnapshot;

use super::{penalty_tensor, Regularizer};

/// Transformed-L1 penalty with shape parameter β: per element,
/// `(1 + β)|a| / (β + |a|)`, averaged over each tapped layer and then
/// across layers.
///
/// As β → 0 the per-element term approaches a step function that strongly
/// rewards exact zeros; as β grows it approaches plain L1 saturating at 1.
#[derive(Debug)]
pub struct TransformedL1 {
    beta: f32,
}

impl TransformedL1 {
    /// β must be positive; `RegularizerConfig::build` enforces this.
    pub fn new(beta: f32) -> Self {
        Self { beta }
    }
}

impl Regularizer for TransformedL1 {
    fn penalty(&self, taps: &ActivationSnapshot) -> Tensor {
        if taps.is_empty() {
            return Tensor::from_vec(vec![0.0], false);
        }

        let beta = self.beta;
        let n_layers = taps.len() as f32;
        let mut value = 0.0f32;
        let mut staged: Vec<(Tensor, Array1<f32>)> = Vec::with_capacity(taps.len());

        for (_, tap) in taps.iter() {
            let data = tap.values.data();
            let n = data.len() as f32;

            value +=
                data.mapv(|a| (1.0 + beta) * a.abs() / (beta + a.abs())).sum() / n / n_layers;

            // d/da of (1+β)|a|/(β+|a|) = (1+β)β sign(a) / (β+|a|)^2
            let grad = data.mapv(|a| {
                let d = beta + a.abs();
                (1.0 + beta) * beta * a.signum() / (d * d) / n / n_layers
            });
            staged.push((tap.values.clone(), grad));
        }

        penalty_tensor(value, staged)
    }

    fn name(&self) -> &'static str {
        "transformed_l1"
    }
}
