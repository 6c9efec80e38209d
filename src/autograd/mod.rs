//! Tape-based autograd engine
//!
//! A tensor is a shared handle over flat `f32` data plus an optional
//! gradient cell and an optional backward operation. Ops build the tape by
//! attaching a `BackwardOp` to their result; `backward` seeds a
//! ones-gradient at the loss and walks the tape recursively.

mod ops;
mod tensor;

pub use ops::{add, dropout, linear, relu, relu_tapped, scale};
pub use tensor::{BackwardOp, Tensor};

use ndarray::Array1;

/// Perform backward pass from a scalar (or elementwise-seeded) tensor
pub fn backward(tensor: &Tensor) {
    tensor.set_grad(Array1::ones(tensor.len()));
    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_seeds_ones() {
        let t = Tensor::from_vec(vec![3.0, 4.0], true);
        backward(&t);
        let grad = t.grad().unwrap();
        assert_eq!(grad.to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_backward_through_chain() {
        // y = 2 * (a + a) => dy/da = 4
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let s = add(&a, &a);
        let y = scale(&s, 2.0);
        backward(&y);
        let grad = a.grad().unwrap();
        assert_eq!(grad.to_vec(), vec![4.0, 4.0]);
    }
}
