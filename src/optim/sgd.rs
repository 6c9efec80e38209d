//! Stochastic Gradient Descent optimizer

use ndarray::Array1;

use crate::autograd::Tensor;
use crate::error::{Error, Result};

use super::{Optimizer, OptimizerState};

/// SGD with optional momentum
pub struct Sgd {
    lr: f32,
    momentum: f32,
    velocities: Vec<Option<Array1<f32>>>,
}

impl Sgd {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self { lr, momentum, velocities: Vec::new() }
    }

    fn ensure_velocities(&mut self, params: &[Tensor]) {
        if self.velocities.is_empty() {
            self.velocities = params.iter().map(|_| None).collect();
        }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_velocities(params);

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad() {
                if self.momentum > 0.0 {
                    // v = momentum * v - lr * grad
                    let velocity = if let Some(v) = &self.velocities[i] {
                        v * self.momentum - &grad * self.lr
                    } else {
                        &grad * (-self.lr)
                    };

                    *param.data_mut() = param.data() + &velocity;
                    self.velocities[i] = Some(velocity);
                } else {
                    *param.data_mut() = param.data() - &(&grad * self.lr);
                }
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn state(&self) -> OptimizerState {
        OptimizerState {
            lr: self.lr,
            velocities: self
                .velocities
                .iter()
                .map(|v| v.as_ref().map(|v| v.to_vec()).unwrap_or_default())
                .collect(),
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        if !state.lr.is_finite() || state.lr <= 0.0 {
            return Err(Error::State(format!("restored lr {} is not usable", state.lr)));
        }
        self.lr = state.lr;
        self.velocities = state
            .velocities
            .into_iter()
            .map(|v| if v.is_empty() { None } else { Some(Array1::from(v)) })
            .collect();
        Ok(())
    }
}
