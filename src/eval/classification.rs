//! Multi-class classification metrics
//!
//! Confusion matrix, per-class precision/recall/F1, and macro/weighted
//! averaging.

/// Averaging strategy for multi-class metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Average {
    /// Unweighted mean over classes
    Macro,
    /// Mean weighted by per-class support
    Weighted,
}

/// Confusion matrix for multi-class classification.
///
/// Element `[i][j]` counts samples with true label `i` predicted as `j`.
#[derive(Clone, Debug)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
}

impl ConfusionMatrix {
    /// Create an empty matrix for `n_classes` classes
    pub fn new(n_classes: usize) -> Self {
        Self { matrix: vec![vec![0; n_classes]; n_classes], n_classes }
    }

    /// Build from parallel prediction/ground-truth label slices
    pub fn from_predictions(y_pred: &[usize], y_true: &[usize], n_classes: usize) -> Self {
        assert_eq!(y_pred.len(), y_true.len(), "predictions and targets must have same length");

        let mut cm = Self::new(n_classes);
        for (&pred, &truth) in y_pred.iter().zip(y_true.iter()) {
            if pred < n_classes && truth < n_classes {
                cm.matrix[truth][pred] += 1;
            }
        }
        cm
    }

    /// Number of classes
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Raw counts
    pub fn matrix(&self) -> &Vec<Vec<usize>> {
        &self.matrix
    }

    /// Correct predictions for `class`
    pub fn true_positives(&self, class: usize) -> usize {
        self.matrix[class][class]
    }

    /// Samples of other classes predicted as `class`
    pub fn false_positives(&self, class: usize) -> usize {
        (0..self.n_classes).filter(|&t| t != class).map(|t| self.matrix[t][class]).sum()
    }

    /// Samples of `class` predicted as something else
    pub fn false_negatives(&self, class: usize) -> usize {
        (0..self.n_classes).filter(|&p| p != class).map(|p| self.matrix[class][p]).sum()
    }

    /// Number of true instances of `class`
    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    /// Total samples counted
    pub fn total(&self) -> usize {
        self.matrix.iter().map(|row| row.iter().sum::<usize>()).sum()
    }

    /// Overall fraction of correct predictions
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.n_classes).map(|c| self.true_positives(c)).sum();
        correct as f64 / total as f64
    }
}

/// Per-class precision/recall/F1 with averaging
#[derive(Clone, Debug)]
pub struct MultiClassMetrics {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub f1: Vec<f64>,
    pub support: Vec<usize>,
}

impl MultiClassMetrics {
    /// Compute metrics from a confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix) -> Self {
        let n = cm.n_classes();
        let mut precision = Vec::with_capacity(n);
        let mut recall = Vec::with_capacity(n);
        let mut f1 = Vec::with_capacity(n);
        let mut support = Vec::with_capacity(n);

        for class in 0..n {
            let tp = cm.true_positives(class) as f64;
            let fp = cm.false_positives(class) as f64;
            let fn_ = cm.false_negatives(class) as f64;

            let p = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
            let r = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
            let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

            precision.push(p);
            recall.push(r);
            f1.push(f);
            support.push(cm.support(class));
        }

        Self { precision, recall, f1, support }
    }

    /// Averaged precision
    pub fn precision_avg(&self, average: Average) -> f64 {
        self.average_metric(&self.precision, average)
    }

    /// Averaged recall
    pub fn recall_avg(&self, average: Average) -> f64 {
        self.average_metric(&self.recall, average)
    }

    /// Averaged F1
    pub fn f1_avg(&self, average: Average) -> f64 {
        self.average_metric(&self.f1, average)
    }

    fn average_metric(&self, values: &[f64], average: Average) -> f64 {
        match average {
            Average::Macro => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            Average::Weighted => {
                let total: usize = self.support.iter().sum();
                if total == 0 {
                    return 0.0;
                }
                values
                    .iter()
                    .zip(self.support.iter())
                    .map(|(&v, &s)| v * s as f64)
                    .sum::<f64>()
                    / total as f64
            }
        }
    }
}
