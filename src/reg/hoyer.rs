//! Hoyer-square penalty

use ndarray::Array1;

use crate::autograd::Tensor;
use crate::instrument::ActivationSnapshot;

use super::{penalty_tensor, Regularizer};

/// Squared-epsilon guard under the L2 norm's square root
const EPS: f32 = 1e-8;

/// Hoyer-square penalty: per sample, the squared ratio of L1 to L2 norm of
/// the flattened activations, averaged over the batch and then across
/// tapped layers.
///
/// Scale-invariant: rescaling a layer's activations by a positive constant
/// leaves the penalty unchanged. Pushes activations toward a few large
/// values and many near-zero values more aggressively than plain L1.
#[derive(Debug)]
pub struct HoyerSquare;

impl HoyerSquare {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HoyerSquare {
    fn default() -> Self {
        Self::new()
    }
}

impl Regularizer for HoyerSquare {
    fn penalty(&self, taps: &ActivationSnapshot) -> Tensor {
        if taps.is_empty() {
            return Tensor::from_vec(vec![0.0], false);
        }

        let n_layers = taps.len() as f32;
        let mut value = 0.0f32;
        let mut staged: Vec<(Tensor, Array1<f32>)> = Vec::with_capacity(taps.len());

        for (_, tap) in taps.iter() {
            let data = tap.values.data();
            let rows = tap.rows.max(1);
            let width = data.len() / rows;
            let mut grad = Array1::zeros(data.len());
            let mut layer_value = 0.0f32;

            for r in 0..rows {
                let sample = &data.as_slice().expect("contiguous")[r * width..(r + 1) * width];
                let s1: f32 = sample.iter().map(|a| a.abs()).sum();
                // q = sum(a^2) + EPS, so L2 = sqrt(q) never divides by zero
                let q: f32 = sample.iter().map(|a| a * a).sum::<f32>() + EPS;
                let ratio_sq = s1 * s1 / q;
                layer_value += ratio_sq;

                // d/da_i (s1^2 / q) = 2 s1 sign(a_i) / q - 2 s1^2 a_i / q^2
                let denom = rows as f32 * n_layers;
                for (i, &a) in sample.iter().enumerate() {
                    grad[r * width + i] =
                        (2.0 * s1 * a.signum() / q - 2.0 * s1 * s1 * a / (q * q)) / denom;
                }
            }

            value += layer_value / rows as f32 / n_layers;
            staged.push((tap.values.clone(), grad));
        }

        penalty_tensor(value, staged)
    }

    fn name(&self) -> &'static str {
        "hoyer_square"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use crate::reg::test_support::{snapshot_of, snapshot_with_rows};
    use approx::assert_relative_eq;

    #[test]
    fn test_hoyer_single_nonzero_is_one() {
        // One hot vector: L1 == L2, ratio squared == 1
        let taps = snapshot_of(&[("a", vec![0.0, 5.0, 0.0, 0.0])]);
        let p = HoyerSquare::new().penalty(&taps);
        assert_relative_eq!(p.data()[0], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_hoyer_dense_equals_dimension() {
        // Uniform vector of n elements: (n*a / (a*sqrt(n)))^2 = n
        let taps = snapshot_of(&[("a", vec![2.0; 4])]);
        let p = HoyerSquare::new().penalty(&taps);
        assert_relative_eq!(p.data()[0], 4.0, epsilon = 1e-4);
    }

    #[test]
    fn test_hoyer_per_sample_batch_mean() {
        // Two samples: one-hot (ratio^2 = 1) and uniform width-2 (ratio^2 = 2)
        let taps = snapshot_with_rows(&[("a", vec![3.0, 0.0, 1.0, 1.0], 2)]);
        let p = HoyerSquare::new().penalty(&taps);
        assert_relative_eq!(p.data()[0], 1.5, epsilon = 1e-4);
    }

    #[test]
    fn test_hoyer_all_zero_sample() {
        let taps = snapshot_of(&[("a", vec![0.0; 4])]);
        let p = HoyerSquare::new().penalty(&taps);
        assert_eq!(p.data()[0], 0.0);
    }

    #[test]
    fn test_hoyer_gradient_is_finite_and_descends_toward_sparsity() {
        let taps = snapshot_of(&[("a", vec![1.0, 0.1])]);
        let p = HoyerSquare::new().penalty(&taps);
        backward(&p);

        let grad = taps.get("a").unwrap().values.grad().unwrap();
        for g in grad.iter() {
            assert!(g.is_finite());
        }
        // Increasing the small element increases the penalty, so its
        // gradient is positive; the dominant element's is negative.
        assert!(grad[1] > 0.0);
        assert!(grad[0] < 0.0);
    }
}
