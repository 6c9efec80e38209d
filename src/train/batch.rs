//! Training batches and the batch source collaborator seam

use crate::autograd::Tensor;
use crate::error::{Error, Result};

/// A batch of stacked inputs with one-hot targets.
///
/// `inputs` is `rows * features` row-major, `targets` is `rows * classes`
/// row-major. Cloning shares the underlying tensors.
#[derive(Clone, Debug)]
pub struct Batch {
    pub inputs: Tensor,
    pub targets: Tensor,
    pub rows: usize,
}

impl Batch {
    pub fn new(inputs: Tensor, targets: Tensor, rows: usize) -> Self {
        assert!(rows > 0, "batch must contain at least one row");
        assert_eq!(inputs.len() % rows, 0, "inputs not divisible into rows");
        assert_eq!(targets.len() % rows, 0, "targets not divisible into rows");
        Self { inputs, targets, rows }
    }
}

/// Collaborator yielding the batches of one split, once per epoch.
///
/// The core consumes this; dataset loading and augmentation live behind it.
pub trait BatchSource {
    fn batches(&mut self) -> Vec<Batch>;
}

/// Batch source over data held in memory, yielding the same batches in the
/// same order every epoch.
pub struct InMemorySource {
    batches: Vec<Batch>,
}

impl InMemorySource {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }

    /// Build from per-sample feature rows and class labels
    pub fn from_rows(
        rows: &[Vec<f32>],
        labels: &[usize],
        n_classes: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if rows.len() != labels.len() {
            return Err(Error::Config(format!(
                "{} feature rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_string()));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(Error::Config(format!("label {bad} out of range for {n_classes} classes")));
        }

        let mut batches = Vec::new();
        for chunk in rows.chunks(batch_size).zip(labels.chunks(batch_size)) {
            let (feature_rows, label_rows) = chunk;
            let n = feature_rows.len();
            let inputs: Vec<f32> = feature_rows.iter().flatten().copied().collect();
            let mut targets = vec![0.0f32; n * n_classes];
            for (r, &label) in label_rows.iter().enumerate() {
                targets[r * n_classes + label] = 1.0;
            }
            batches.push(Batch::new(
                Tensor::from_vec(inputs, false),
                Tensor::from_vec(targets, false),
                n,
            ));
        }
        Ok(Self { batches })
    }
}

impl BatchSource for InMemorySource {
    fn batches(&mut self) -> Vec<Batch> {
        self.batches.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_one_hot() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let labels = vec![0, 2, 1];
        let mut source = InMemorySource::from_rows(&rows, &labels, 3, 2).unwrap();

        let batches = source.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].rows, 2);
        assert_eq!(batches[0].inputs.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(batches[0].targets.to_vec(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(batches[1].rows, 1);
        assert_eq!(batches[1].targets.to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_from_rows_rejects_bad_labels() {
        let rows = vec![vec![1.0]];
        assert!(InMemorySource::from_rows(&rows, &[5], 3, 2).is_err());
        assert!(InMemorySource::from_rows(&rows, &[0, 1], 3, 2).is_err());
        assert!(InMemorySource::from_rows(&rows, &[0], 3, 0).is_err());
    }

    #[test]
    fn test_same_order_every_epoch() {
        let rows = vec![vec![1.0], vec![2.0]];
        let mut source = InMemorySource::from_rows(&rows, &[0, 1], 2, 1).unwrap();

        let first: Vec<Vec<f32>> = source.batches().iter().map(|b| b.inputs.to_vec()).collect();
        let second: Vec<Vec<f32>> = source.batches().iter().map(|b| b.inputs.to_vec()).collect();
        assert_eq!(first, second);
    }

    #[test]
    #[should_panic(expected = "at least one row")]
    fn test_batch_rejects_zero_rows() {
        Batch::new(Tensor::zeros(2, false), Tensor::zeros(2, false), 0);
    }
}
