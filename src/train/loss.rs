//! Batched cross-entropy loss

use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

use crate::autograd::{BackwardOp, Tensor};

/// Cross-entropy over a batch of logit rows.
///
/// `L = -(1/rows) * sum_r sum_c t[r,c] * log softmax(x[r])[c]`
///
/// The backward is fused: `dL/dx = (softmax(x) - t) / rows`, propagated
/// into the logits' producing op.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Numerically stable softmax of one logit row
    pub fn softmax_row(row: &[f32]) -> Vec<f32> {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let exp: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
        let sum: f32 = exp.iter().sum();
        exp.into_iter().map(|v| v / sum).collect()
    }

    /// Mean cross-entropy over `rows` stacked rows of logits/one-hot targets
    pub fn forward(&self, logits: &Tensor, targets: &Tensor, rows: usize) -> Tensor {
        assert_eq!(logits.len(), targets.len(), "logits and targets must have same length");
        assert!(rows > 0 && logits.len() % rows == 0, "logits not divisible into rows");
        let width = logits.len() / rows;

        let xd = logits.data();
        let td = targets.data();
        let x = xd.as_slice().expect("contiguous");
        let t = td.as_slice().expect("contiguous");

        let mut total = 0.0f32;
        let mut grad = vec![0.0f32; logits.len()];
        for r in 0..rows {
            let probs = Self::softmax_row(&x[r * width..(r + 1) * width]);
            for c in 0..width {
                let target = t[r * width + c];
                let p = probs[c];
                total += -target * (p + 1e-10).max(f32::MIN_POSITIVE).ln();
                grad[r * width + c] = (p - target) / rows as f32;
            }
        }

        let mut loss = Tensor::from_vec(vec![total / rows as f32], logits.requires_grad());

        if logits.requires_grad() {
            let backward_op = Rc::new(CrossEntropyBackward {
                logits: logits.clone(),
                grad: Array1::from(grad),
                result_grad: loss.grad_cell(),
            });
            loss.set_backward_op(backward_op);
        }

        loss
    }
}

struct CrossEntropyBackward {
    logits: Tensor,
    grad: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for CrossEntropyBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            self.logits.accumulate_grad(&self.grad * grad[0]);

            if let Some(op) = self.logits.backward_op() {
                op.backward();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_relative_eq;

    #[test]
    fn test_softmax_row_sums_to_one() {
        let probs = CrossEntropyLoss::softmax_row(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(probs.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        let probs = CrossEntropyLoss::softmax_row(&[1000.0, 1001.0, 1002.0]);
        assert_relative_eq!(probs.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        for &p in &probs {
            assert!(p.is_finite());
        }
    }

    #[test]
    fn test_uniform_logits_loss_is_log_c() {
        for &nc in &[2usize, 3, 5, 10] {
            let logits = Tensor::from_vec(vec![1.0; nc], false);
            let mut target = vec![0.0; nc];
            target[0] = 1.0;
            let targets = Tensor::from_vec(target, false);

            let loss = CrossEntropyLoss.forward(&logits, &targets, 1);
            assert_relative_eq!(loss.data()[0], (nc as f32).ln(), epsilon = 1e-4);
        }
    }

    #[test]
    fn test_batch_mean() {
        // Two identical rows: mean equals the single-row loss
        let logits1 = Tensor::from_vec(vec![2.0, 0.0], false);
        let targets1 = Tensor::from_vec(vec![1.0, 0.0], false);
        let single = CrossEntropyLoss.forward(&logits1, &targets1, 1).data()[0];

        let logits2 = Tensor::from_vec(vec![2.0, 0.0, 2.0, 0.0], false);
        let targets2 = Tensor::from_vec(vec![1.0, 0.0, 1.0, 0.0], false);
        let pair = CrossEntropyLoss.forward(&logits2, &targets2, 2).data()[0];

        assert_relative_eq!(single, pair, epsilon = 1e-6);
    }

    #[test]
    fn test_gradient_is_probs_minus_targets() {
        let logits = Tensor::from_vec(vec![0.0, 0.0], true);
        let targets = Tensor::from_vec(vec![1.0, 0.0], false);

        let loss = CrossEntropyLoss.forward(&logits, &targets, 1);
        backward(&loss);

        let grad = logits.grad().unwrap();
        assert_relative_eq!(grad[0], -0.5, epsilon = 1e-6);
        assert_relative_eq!(grad[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_perfect_prediction_near_zero_loss() {
        let logits = Tensor::from_vec(vec![50.0, -50.0], false);
        let targets = Tensor::from_vec(vec![1.0, 0.0], false);
        let loss = CrossEntropyLoss.forward(&logits, &targets, 1);
        assert!(loss.data()[0] < 1e-3);
    }

    #[test]
    fn test_no_grad_logits_detached_loss() {
        let logits = Tensor::from_vec(vec![1.0, 2.0], false);
        let targets = Tensor::from_vec(vec![0.0, 1.0], false);
        let loss = CrossEntropyLoss.forward(&logits, &targets, 1);
        assert!(loss.backward_op().is_none());
        assert!(loss.data()[0] > 0.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Cross-entropy of one-hot targets is non-negative and finite
        #[test]
        fn cross_entropy_non_negative(
            nc in 2usize..8,
            target in 0usize..8,
            scale in 0.1f32..50.0,
            seed in 0u32..1000,
        ) {
            let target = target % nc;
            let logits_vec: Vec<f32> = (0..nc)
                .map(|i| ((i as f32 + seed as f32) * 0.37).sin() * scale)
                .collect();
            let mut target_vec = vec![0.0; nc];
            target_vec[target] = 1.0;

            let logits = Tensor::from_vec(logits_vec, false);
            let targets = Tensor::from_vec(target_vec, false);
            let loss = CrossEntropyLoss.forward(&logits, &targets, 1).data()[0];

            prop_assert!(loss >= -1e-6);
            prop_assert!(loss.is_finite());
        }
    }
}
