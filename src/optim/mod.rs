//! Optimizers and learning-rate scheduling

mod optimizer;
mod plateau;
mod sgd;

pub use optimizer::{Optimizer, OptimizerState};
pub use plateau::{PlateauState, ReduceLrOnPlateau};
pub use sgd::Sgd;
