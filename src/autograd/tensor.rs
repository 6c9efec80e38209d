//! Shared-handle tensor with gradient cell

use ndarray::Array1;
use std::cell::{RefCell, RefMut};
use std::rc::Rc;

/// Backward operation attached to an op's result tensor
pub trait BackwardOp {
    fn backward(&self);
}

/// A 1-D `f32` tensor with optional gradient tracking.
///
/// Cloning a `Tensor` clones the *handle*: data, gradient, and backward op
/// are shared. Ops rely on this so that gradients accumulated through a
/// cloned handle are visible to the original.
#[derive(Clone)]
pub struct Tensor {
    data: Rc<RefCell<Array1<f32>>>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    requires_grad: bool,
    backward_op: Rc<RefCell<Option<Rc<dyn BackwardOp>>>>,
}

impl Tensor {
    /// Create a tensor from an array
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        Self {
            data: Rc::new(RefCell::new(data)),
            grad: Rc::new(RefCell::new(None)),
            requires_grad,
            backward_op: Rc::new(RefCell::new(None)),
        }
    }

    /// Create a tensor from a vec
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Create a zero-filled tensor
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(len), requires_grad)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Whether the tensor is empty
    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }

    /// Snapshot of the current data
    pub fn data(&self) -> Array1<f32> {
        self.data.borrow().clone()
    }

    /// Mutable access to the underlying data
    pub fn data_mut(&self) -> RefMut<'_, Array1<f32>> {
        self.data.borrow_mut()
    }

    /// Copy of the current data as a vec
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.borrow().to_vec()
    }

    /// Whether gradients are tracked for this tensor
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Snapshot of the accumulated gradient, if any
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// The shared gradient cell (used by backward ops)
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        Rc::clone(&self.grad)
    }

    /// Replace the gradient
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add into the gradient, initializing it if absent
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut cell = self.grad.borrow_mut();
        match cell.as_mut() {
            Some(existing) => *existing = &*existing + &grad,
            None => *cell = Some(grad),
        }
    }

    /// Clear the gradient
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Attach the backward operation producing this tensor
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        *self.backward_op.borrow_mut() = Some(op);
    }

    /// The backward operation producing this tensor, if any
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.borrow().clone()
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("data", &self.data.borrow())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}
