//! Activation instrumentation
//!
//! Nonlinearity outputs are observed through a [`TapRegistry`]: an observer
//! registry shared between the model graph and the caller. Tapped ops
//! record their output under a stable, human-readable path name; the
//! registry is cleared at the start of every forward pass, so a snapshot
//! always describes exactly the most recent pass. Tapping never alters the
//! forward computation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::autograd::Tensor;

/// One tapped activation: the post-nonlinearity tensor of the most recent
/// forward pass, plus the batch-row count needed to split it per sample.
#[derive(Clone, Debug)]
pub struct Tap {
    /// Live handle to the activation tensor (shares its grad cell)
    pub values: Tensor,
    /// Batch rows in this activation
    pub rows: usize,
}

/// Mapping from layer path name to its tapped activation.
///
/// Ordered (BTreeMap) so that iteration, logging, and reports are stable.
#[derive(Clone, Debug, Default)]
pub struct ActivationSnapshot {
    taps: BTreeMap<String, Tap>,
}

impl ActivationSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tapped layers
    pub fn len(&self) -> usize {
        self.taps.len()
    }

    /// Whether any layer has been tapped
    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Look up a tap by layer name
    pub fn get(&self, name: &str) -> Option<&Tap> {
        self.taps.get(name)
    }

    /// Iterate taps in layer-name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tap)> {
        self.taps.iter()
    }

    fn insert(&mut self, name: String, tap: Tap) {
        self.taps.insert(name, tap);
    }

    fn clear(&mut self) {
        self.taps.clear();
    }
}

/// Observer registry attached to a model graph at construction.
///
/// The model calls [`TapRegistry::begin_pass`] at the top of each forward
/// and tapped ops call [`TapRegistry::record`]; the caller reads the result
/// with [`TapRegistry::snapshot`]. Handles are shared, so the registry can
/// be cloned into the graph while the owner keeps reading it.
#[derive(Clone, Debug, Default)]
pub struct TapRegistry {
    inner: Rc<RefCell<ActivationSnapshot>>,
}

impl TapRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all taps from the previous pass
    pub fn begin_pass(&self) {
        self.inner.borrow_mut().clear();
    }

    /// Record one tapped activation
    pub fn record(&self, name: &str, values: Tensor, rows: usize) {
        self.inner.borrow_mut().insert(name.to_string(), Tap { values, rows });
    }

    /// Snapshot of the most recent pass (tensor handles are shared, not copied)
    pub fn snapshot(&self) -> ActivationSnapshot {
        self.inner.borrow().clone()
    }
}
