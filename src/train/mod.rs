//! Training loop engine
//!
//! One training run is a resumable sequence of epochs:
//! train → validate → adjust rate → check improvement → maybe checkpoint →
//! maybe stop. The engine owns the run's [`TrainingState`] exclusively and
//! converts internal failures into an infinite objective at the run
//! boundary.

mod batch;
mod engine;
mod loss;
mod state;

pub use batch::{Batch, BatchSource, InMemorySource};
pub use engine::{RunOutcome, RunStatus, TrainLoop};
pub use loss::CrossEntropyLoss;
pub use state::{History, TrainingState};

pub(crate) use engine::argmax;
pub(crate) use state::non_finite_as_null;
