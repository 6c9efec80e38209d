//! Mean-absolute-activation penalty

use ndarray::Array1;

use crate::autograd::Tensor;
use crate::instrument::ActivationSnapshot;

use super::{penalty_tensor, Regularizer};

/// L1 penalty: mean over tapped layers of the mean |a| within each layer.
///
/// Encourages uniform sparsity across all activations.
#[derive(Debug)]
pub struct L1Penalty;

impl Regularizer for L1Penalty {
    fn penalty(&self, taps: &ActivationSnapshot) -> Tensor {
        if taps.is_empty() {
            return Tensor::from_vec(vec![0.0], false);
        }

        let n_layers = taps.len() as f32;
        let mut value = 0.0f32;
        let mut staged: Vec<(Tensor, Array1<f32>)> = Vec::with_capacity(taps.len());

        for (_, tap) in taps.iter() {
            let data = tap.values.data();
            let n = data.len() as f32;
            value += data.mapv(f32::abs).sum() / n / n_layers;

            // d/da_i of mean|a| / n_layers
            let grad = data.mapv(|a| a.signum() / n / n_layers);
            staged.push((tap.values.clone(), grad));
        }

        penalty_tensor(value, staged)
    }

    fn name(&self) -> &'static str {
        "l1"
    }
}
