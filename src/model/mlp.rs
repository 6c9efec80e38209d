//! Tapped multilayer perceptron

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::autograd::{dropout, linear, relu_tapped, Tensor};
use crate::error::{Error, Result};
use crate::instrument::{ActivationSnapshot, TapRegistry};

use super::{ForwardMode, ModelState, Network};

/// Fully connected classifier with a tapped ReLU after every hidden layer
/// and inverted dropout between layers.
///
/// Stands in for the external architecture: taps are wired in when the
/// graph is built, exactly one per nonlinearity, named `fc{i}.relu`.
pub struct SparseMlp {
    dims: Vec<usize>,
    weights: Vec<Tensor>,
    biases: Vec<Tensor>,
    dropout_rate: f32,
    taps: TapRegistry,
    rng: StdRng,
}

impl SparseMlp {
    /// Create a model with the given layer widths `[input, hidden..., classes]`.
    pub fn new(dims: &[usize], dropout_rate: f32, seed: u64) -> Result<Self> {
        if dims.len() < 2 {
            return Err(Error::Config(format!(
                "model needs at least input and output dims, got {dims:?}"
            )));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(Error::Config("layer widths must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&dropout_rate) {
            return Err(Error::Config(format!("dropout rate must be in [0, 1), got {dropout_rate}")));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut weights = Vec::with_capacity(dims.len() - 1);
        let mut biases = Vec::with_capacity(dims.len() - 1);

        for l in 0..dims.len() - 1 {
            let (fan_in, fan_out) = (dims[l], dims[l + 1]);
            let bound = 1.0 / (fan_in as f32).sqrt();
            let w: Vec<f32> =
                (0..fan_out * fan_in).map(|_| (rng.random::<f32>() * 2.0 - 1.0) * bound).collect();
            weights.push(Tensor::from_vec(w, true));
            biases.push(Tensor::zeros(fan_out, true));
        }

        Ok(Self {
            dims: dims.to_vec(),
            weights,
            biases,
            dropout_rate,
            taps: TapRegistry::new(),
            rng,
        })
    }

    /// Reseed the model's stochastic elements (dropout masks)
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Input feature count
    pub fn input_dim(&self) -> usize {
        self.dims[0]
    }

    fn layer_count(&self) -> usize {
        self.dims.len() - 1
    }
}

impl Network for SparseMlp {
    fn forward(&mut self, inputs: &Tensor, rows: usize, mode: ForwardMode) -> Tensor {
        self.taps.begin_pass();

        let last = self.layer_count() - 1;
        let mut x = inputs.clone();
        for l in 0..=last {
            let z = linear(&x, &self.weights[l], &self.biases[l], rows, self.dims[l], self.dims[l + 1]);
            if l == last {
                return z;
            }
            let mut h = relu_tapped(&z, rows, &format!("fc{l}.relu"), &self.taps);
            if mode.stochastic() && self.dropout_rate > 0.0 {
                h = dropout(&h, self.dropout_rate, &mut self.rng);
            }
            x = h;
        }
        unreachable!("loop returns at the output layer")
    }

    fn taps(&self) -> ActivationSnapshot {
        self.taps.snapshot()
    }

    fn params(&self) -> Vec<Tensor> {
        self.weights.iter().chain(self.biases.iter()).cloned().collect()
    }

    fn named_params(&self) -> Vec<(String, Tensor)> {
        let mut out = Vec::with_capacity(2 * self.layer_count());
        for l in 0..self.layer_count() {
            out.push((format!("fc{l}.weight"), self.weights[l].clone()));
            out.push((format!("fc{l}.bias"), self.biases[l].clone()));
        }
        out
    }

    fn state(&self) -> ModelState {
        ModelState {
            tensors: self
                .named_params()
                .into_iter()
                .map(|(name, tensor)| (name, tensor.to_vec()))
                .collect(),
        }
    }

    fn load_state(&mut self, state: &ModelState) -> Result<()> {
        for (name, param) in self.named_params() {
            let values = state
                .get(&name)
                .ok_or_else(|| Error::State(format!("checkpoint is missing parameter '{name}'")))?;
            if values.len() != param.len() {
                return Err(Error::State(format!(
                    "parameter '{name}' has {} values, expected {}",
                    values.len(),
                    param.len()
                )));
            }
            let mut data = param.data_mut();
            for (slot, &v) in data.iter_mut().zip(values.iter()) {
                *slot = v;
            }
        }
        Ok(())
    }

    fn n_classes(&self) -> usize {
        *self.dims.last().expect("validated at construction")
    }
}
