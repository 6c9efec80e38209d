//! Sequential model-based hyperparameter search
//!
//! An ask/tell loop over an ordered [`SearchSpace`], backed by a
//! [`TpeSurrogate`] and a crash-safe [`TrialLog`] that is fully rewritten
//! after every completed trial.

mod log;
mod runner;
mod space;
mod surrogate;

pub use log::{Trial, TrialLog};
pub use runner::SearchLoop;
pub use space::{ParameterDomain, ParameterValue, SearchSpace};
pub use surrogate::{Surrogate, TpeSurrogate};
