//! JSON dataset loading for the binary
//!
//! Dataset loading proper is a collaborator of the core; the binary reads
//! a simple pre-extracted feature format:
//!
//! ```json
//! { "n_classes": 3, "features": [[0.1, 0.2], ...], "labels": [0, 2, ...] }
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};
use crate::train::InMemorySource;

/// A split of pre-extracted feature rows with class labels
#[derive(Debug, Clone, Deserialize)]
pub struct JsonDataset {
    pub n_classes: usize,
    pub features: Vec<Vec<f32>>,
    pub labels: Vec<usize>,
}

impl JsonDataset {
    /// Load and sanity-check a dataset file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let dataset: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("bad dataset file: {e}")))?;

        if dataset.features.is_empty() {
            return Err(Error::Config("dataset has no samples".to_string()));
        }
        if dataset.n_classes < 2 {
            return Err(Error::Config("dataset needs at least two classes".to_string()));
        }
        let width = dataset.features[0].len();
        if width == 0 || dataset.features.iter().any(|row| row.len() != width) {
            return Err(Error::Config("feature rows must be non-empty and uniform".to_string()));
        }
        Ok(dataset)
    }

    /// Feature count per sample
    pub fn input_dim(&self) -> usize {
        self.features[0].len()
    }

    /// Batch source over this split
    pub fn source(&self, batch_size: usize) -> Result<InMemorySource> {
        InMemorySource::from_rows(&self.features, &self.labels, self.n_classes, batch_size)
    }
}
