//! Distance-from-source regularization

use ndarray::Array1;

use crate::autograd::Tensor;

use super::penalty_tensor;

/// Penalty proportional to the squared distance between the current
/// parameters and a fixed pretrained reference.
///
/// Only parameters whose name and shape match a reference entry and whose
/// gradient is enabled contribute; everything else is skipped silently.
/// Parameters are tape leaves, so the staged backward is complete on its
/// own.
#[derive(Debug)]
pub struct SourceDistance {
    reference: Vec<(String, Array1<f32>)>,
}

impl SourceDistance {
    /// Build from a named parameter blob (e.g. a pretrained model state)
    pub fn new(reference: Vec<(String, Vec<f32>)>) -> Self {
        Self {
            reference: reference
                .into_iter()
                .map(|(name, values)| (name, Array1::from(values)))
                .collect(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Array1<f32>> {
        self.reference.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Unscaled penalty `sum ||w - w_ref||^2` over matching parameters
    pub fn penalty(&self, params: &[(String, Tensor)]) -> Tensor {
        let mut value = 0.0f32;
        let mut staged: Vec<(Tensor, Array1<f32>)> = Vec::new();

        for (name, param) in params {
            if !param.requires_grad() {
                continue;
            }
            let Some(reference) = self.lookup(name) else { continue };
            if reference.len() != param.len() {
                continue;
            }

            let diff = param.data() - reference;
            value += diff.mapv(|d| d * d).sum();
            staged.push((param.clone(), diff * 2.0));
        }

        penalty_tensor(value, staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_relative_eq;

    fn named(name: &str, values: Vec<f32>, requires_grad: bool) -> (String, Tensor) {
        (name.to_string(), Tensor::from_vec(values, requires_grad))
    }

    #[test]
    fn test_distance_value_and_gradient() {
        let source = SourceDistance::new(vec![("w".to_string(), vec![1.0, 1.0])]);
        let params = vec![named("w", vec![2.0, 0.0], true)];

        let p = source.penalty(&params);
        assert_relative_eq!(p.data()[0], 2.0); // (2-1)^2 + (0-1)^2

        backward(&p);
        let grad = params[0].1.grad().unwrap();
        assert_eq!(grad.to_vec(), vec![2.0, -2.0]); // 2 (w - ref)
    }

    #[test]
    fn test_distance_skips_shape_mismatch() {
        let source = SourceDistance::new(vec![("w".to_string(), vec![1.0, 1.0, 1.0])]);
        let params = vec![named("w", vec![5.0, 5.0], true)];

        let p = source.penalty(&params);
        assert_eq!(p.data()[0], 0.0);
        assert!(p.backward_op().is_none());
    }

    #[test]
    fn test_distance_skips_frozen_params() {
        let source = SourceDistance::new(vec![("w".to_string(), vec![0.0])]);
        let params = vec![named("w", vec![3.0], false)];

        let p = source.penalty(&params);
        assert_eq!(p.data()[0], 0.0);
    }

    #[test]
    fn test_distance_skips_unknown_names() {
        let source = SourceDistance::new(vec![("w".to_string(), vec![0.0])]);
        let params = vec![named("other", vec![3.0], true)];

        let p = source.penalty(&params);
        assert_eq!(p.data()[0], 0.0);
    }

    #[test]
    fn test_distance_zero_at_reference() {
        let source = SourceDistance::new(vec![("w".to_string(), vec![0.5, -0.5])]);
        let params = vec![named("w", vec![0.5, -0.5], true)];

        let p = source.penalty(&params);
        assert_eq!(p.data()[0], 0.0);
    }
}
