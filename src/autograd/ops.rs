//! Autograd operations: add, scale, relu, dropout, linear
//!
//! Each op computes its forward result eagerly and, when gradients are
//! required, attaches a backward object holding handles to its inputs.
//! Backward objects accumulate into their inputs' grad cells and recurse
//! into the inputs' own backward ops.

use ndarray::Array1;
use rand::Rng;
use std::cell::RefCell;
use std::rc::Rc;

use crate::instrument::TapRegistry;

use super::tensor::{BackwardOp, Tensor};

/// Add two tensors elementwise
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    let data = a.data() + b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.clone());
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
            if let Some(op) = self.b.backward_op() {
                op.backward();
            }
        }
    }
}

/// Scale a tensor by a scalar
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data() * factor;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * self.factor);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x.max(0.0));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ReluBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

/// ReLU that also records its output under `name` in the tap registry.
///
/// The forward output is identical to `relu`; recording is the only side
/// effect. The recorded handle shares the output's grad cell, so penalty
/// gradients staged into it flow back through this op.
pub fn relu_tapped(a: &Tensor, rows: usize, name: &str, taps: &TapRegistry) -> Tensor {
    let result = relu(a);
    taps.record(name, result.clone(), rows);
    result
}

struct ReluBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ReluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // dL/da = dL/dout * (a > 0)
                let grad_a = grad * &self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Inverted dropout: zero each element with probability `p`, scale
/// survivors by `1 / (1 - p)`. `p <= 0` is the identity.
pub fn dropout<R: Rng>(a: &Tensor, p: f32, rng: &mut R) -> Tensor {
    if p <= 0.0 {
        return a.clone();
    }
    assert!(p < 1.0, "dropout rate must be below 1, got {p}");

    let keep = 1.0 - p;
    let mask: Array1<f32> = Array1::from(
        (0..a.len())
            .map(|_| if rng.random::<f32>() < keep { 1.0 / keep } else { 0.0 })
            .collect::<Vec<f32>>(),
    );

    let data = a.data() * &mask;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(DropoutBackward {
            a: a.clone(),
            mask,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct DropoutBackward {
    a: Tensor,
    mask: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for DropoutBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * &self.mask);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Fused affine layer: `y[r, o] = sum_i w[o, i] * x[r, i] + b[o]`.
///
/// `x` is `rows * in_dim` row-major, `w` is `out_dim * in_dim` row-major,
/// `b` is `out_dim`. Result is `rows * out_dim` row-major.
pub fn linear(x: &Tensor, w: &Tensor, b: &Tensor, rows: usize, in_dim: usize, out_dim: usize) -> Tensor {
    assert_eq!(x.len(), rows * in_dim, "input shape mismatch");
    assert_eq!(w.len(), out_dim * in_dim, "weight shape mismatch");
    assert_eq!(b.len(), out_dim, "bias shape mismatch");

    let xd = x.data();
    let wd = w.data();
    let bd = b.data();

    let mut out = vec![0.0f32; rows * out_dim];
    for r in 0..rows {
        for o in 0..out_dim {
            let mut acc = bd[o];
            for i in 0..in_dim {
                acc += wd[o * in_dim + i] * xd[r * in_dim + i];
            }
            out[r * out_dim + o] = acc;
        }
    }

    let requires_grad = x.requires_grad() || w.requires_grad() || b.requires_grad();
    let mut result = Tensor::from_vec(out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LinearBackward {
            x: x.clone(),
            w: w.clone(),
            b: b.clone(),
            rows,
            in_dim,
            out_dim,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct LinearBackward {
    x: Tensor,
    w: Tensor,
    b: Tensor,
    rows: usize,
    in_dim: usize,
    out_dim: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for LinearBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let xd = self.x.data();
            let wd = self.w.data();

            if self.w.requires_grad() {
                // dL/dw[o, i] = sum_r g[r, o] * x[r, i]
                let mut gw = vec![0.0f32; self.out_dim * self.in_dim];
                for r in 0..self.rows {
                    for o in 0..self.out_dim {
                        let g = grad[r * self.out_dim + o];
                        for i in 0..self.in_dim {
                            gw[o * self.in_dim + i] += g * xd[r * self.in_dim + i];
                        }
                    }
                }
                self.w.accumulate_grad(Array1::from(gw));
            }

            if self.b.requires_grad() {
                // dL/db[o] = sum_r g[r, o]
                let mut gb = vec![0.0f32; self.out_dim];
                for r in 0..self.rows {
                    for o in 0..self.out_dim {
                        gb[o] += grad[r * self.out_dim + o];
                    }
                }
                self.b.accumulate_grad(Array1::from(gb));
            }

            if self.x.requires_grad() {
                // dL/dx[r, i] = sum_o g[r, o] * w[o, i]
                let mut gx = vec![0.0f32; self.rows * self.in_dim];
                for r in 0..self.rows {
                    for o in 0..self.out_dim {
                        let g = grad[r * self.out_dim + o];
                        for i in 0..self.in_dim {
                            gx[r * self.in_dim + i] += g * wd[o * self.in_dim + i];
                        }
                    }
                }
                self.x.accumulate_grad(Array1::from(gx));
            }

            if let Some(op) = self.x.backward_op() {
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
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_add_forward_backward() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = Tensor::from_vec(vec![3.0, 4.0], true);
        let c = add(&a, &b);
        assert_eq!(c.to_vec(), vec![4.0, 6.0]);

        backward(&c);
        assert_eq!(a.grad().unwrap().to_vec(), vec![1.0, 1.0]);
        assert_eq!(b.grad().unwrap().to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_scale_backward() {
        let a = Tensor::from_vec(vec![1.0, -2.0], true);
        let y = scale(&a, 3.0);
        assert_eq!(y.to_vec(), vec![3.0, -6.0]);

        backward(&y);
        assert_eq!(a.grad().unwrap().to_vec(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_relu_forward_backward() {
        let a = Tensor::from_vec(vec![-1.0, 0.0, 2.0], true);
        let y = relu(&a);
        assert_eq!(y.to_vec(), vec![0.0, 0.0, 2.0]);

        backward(&y);
        // Gradient passes only where a > 0
        assert_eq!(a.grad().unwrap().to_vec(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_dropout_zero_rate_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], false);
        let y = dropout(&a, 0.0, &mut rng);
        assert_eq!(y.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_dropout_scales_survivors() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Tensor::from_vec(vec![1.0; 1000], false);
        let y = dropout(&a, 0.5, &mut rng);

        let kept: Vec<f32> = y.to_vec().into_iter().filter(|&v| v != 0.0).collect();
        for &v in &kept {
            assert_relative_eq!(v, 2.0);
        }
        // Roughly half survive
        assert!(kept.len() > 350 && kept.len() < 650, "kept {}", kept.len());
    }

    #[test]
    fn test_linear_forward() {
        // 2x2 weight [[1, 2], [3, 4]], bias [0.5, -0.5], one row [1, 1]
        let x = Tensor::from_vec(vec![1.0, 1.0], false);
        let w = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], true);
        let b = Tensor::from_vec(vec![0.5, -0.5], true);

        let y = linear(&x, &w, &b, 1, 2, 2);
        assert_eq!(y.to_vec(), vec![3.5, 6.5]);
    }

    #[test]
    fn test_linear_backward_weights_and_bias() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false); // 2 rows, in=2
        let w = Tensor::from_vec(vec![0.1, 0.2], true); // out=1
        let b = Tensor::from_vec(vec![0.0], true);

        let y = linear(&x, &w, &b, 2, 2, 1);
        backward(&y);

        // gw[i] = sum_r x[r, i]; gb = rows
        assert_eq!(w.grad().unwrap().to_vec(), vec![4.0, 6.0]);
        assert_eq!(b.grad().unwrap().to_vec(), vec![2.0]);
    }

    #[test]
    fn test_linear_backward_propagates_to_input() {
        let x0 = Tensor::from_vec(vec![1.0, 1.0], true);
        let w1 = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], true); // identity
        let b1 = Tensor::zeros(2, true);
        let w2 = Tensor::from_vec(vec![2.0, 3.0], true);
        let b2 = Tensor::zeros(1, true);

        let h = linear(&x0, &w1, &b1, 1, 2, 2);
        let y = linear(&h, &w2, &b2, 1, 2, 1);
        backward(&y);

        // dL/dx0 = w1^T w2 = [2, 3]
        assert_eq!(x0.grad().unwrap().to_vec(), vec![2.0, 3.0]);
    }

    #[test]
    #[should_panic(expected = "weight shape mismatch")]
    fn test_linear_shape_mismatch_panics() {
        let x = Tensor::zeros(2, false);
        let w = Tensor::zeros(3, false);
        let b = Tensor::zeros(1, false);
        linear(&x, &w, &b, 1, 2, 1);
    }
}
