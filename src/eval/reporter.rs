//! Evaluation of trained checkpoints

use tracing::info;

use crate::checkpoint::{BestCheckpoint, CheckpointManager};
use crate::error::{Error, Result};
use crate::model::{ForwardMode, Network};
use crate::train::{argmax, BatchSource, CrossEntropyLoss};

use super::classification::{Average, ConfusionMatrix, MultiClassMetrics};

/// Metrics of one evaluation over a held-out set.
///
/// Precision, recall, and F1 are support-weighted averages.
#[derive(Clone, Debug)]
pub struct EvalReport {
    pub loss: f32,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,
}

/// Restore the best checkpoint of a run into `model`.
///
/// A missing best checkpoint is reported as [`Error::MissingCheckpoint`];
/// the caller aborts evaluation without crashing.
pub fn restore_best(
    manager: &CheckpointManager,
    model: &mut dyn Network,
) -> Result<BestCheckpoint> {
    let best = manager.load_best()?;
    model.load_state(&best.model)?;
    info!(valid_loss = best.valid_loss, "restored best checkpoint for evaluation");
    Ok(best)
}

/// Evaluator over a held-out split
pub struct Evaluator;

impl Evaluator {
    /// Deterministic evaluation: one `Eval` forward per batch
    pub fn evaluate(
        &self,
        model: &mut dyn Network,
        data: &mut dyn BatchSource,
    ) -> Result<EvalReport> {
        let n_classes = model.n_classes();
        let loss_fn = CrossEntropyLoss;
        let mut y_pred = Vec::new();
        let mut y_true = Vec::new();
        let mut total_loss = 0.0f32;
        let mut num_batches = 0usize;

        for batch in data.batches() {
            let logits = model.forward(&batch.inputs, batch.rows, ForwardMode::Eval);
            total_loss += loss_fn.forward(&logits, &batch.targets, batch.rows).data()[0];
            num_batches += 1;

            collect_labels(
                &logits.to_vec(),
                &batch.targets.to_vec(),
                batch.rows,
                n_classes,
                &mut y_pred,
                &mut y_true,
            );
        }

        if num_batches == 0 {
            return Err(Error::State("evaluation batch source yielded no data".to_string()));
        }
        Ok(build_report(total_loss / num_batches as f32, &y_pred, &y_true, n_classes))
    }

    /// Uncertainty evaluation: `n_passes` stochastic forwards per batch,
    /// class probabilities averaged per input.
    ///
    /// Returns the report computed from the averaged predictions plus one
    /// predictive-entropy score per input, in dataset order. Parameters
    /// stay frozen throughout; only the stochastic path varies between
    /// passes, and the pass randomness has no effect on how metrics are
    /// aggregated.
    pub fn evaluate_mc(
        &self,
        model: &mut dyn Network,
        data: &mut dyn BatchSource,
        n_passes: usize,
    ) -> Result<(EvalReport, Vec<f64>)> {
        if n_passes == 0 {
            return Err(Error::Config("n_passes must be positive".to_string()));
        }

        let n_classes = model.n_classes();
        let mut y_pred = Vec::new();
        let mut y_true = Vec::new();
        let mut entropies = Vec::new();
        let mut total_nll = 0.0f64;
        let mut total_rows = 0usize;

        for batch in data.batches() {
            let mut mean_probs = vec![0.0f64; batch.rows * n_classes];
            for _ in 0..n_passes {
                let logits = model.forward(&batch.inputs, batch.rows, ForwardMode::Stochastic);
                let flat = logits.to_vec();
                for r in 0..batch.rows {
                    let probs =
                        CrossEntropyLoss::softmax_row(&flat[r * n_classes..(r + 1) * n_classes]);
                    for (c, &p) in probs.iter().enumerate() {
                        mean_probs[r * n_classes + c] += p as f64 / n_passes as f64;
                    }
                }
            }

            let targets = batch.targets.to_vec();
            for r in 0..batch.rows {
                let probs = &mean_probs[r * n_classes..(r + 1) * n_classes];
                let truth = argmax(&targets[r * n_classes..(r + 1) * n_classes]);

                let pred = probs
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                y_pred.push(pred);
                y_true.push(truth);

                entropies.push(predictive_entropy(probs));
                total_nll += -(probs[truth].max(1e-12)).ln();
                total_rows += 1;
            }
        }

        if total_rows == 0 {
            return Err(Error::State("evaluation batch source yielded no data".to_string()));
        }
        let report =
            build_report((total_nll / total_rows as f64) as f32, &y_pred, &y_true, n_classes);
        Ok((report, entropies))
    }
}

/// Shannon entropy of one probability vector (natural log)
pub fn predictive_entropy(probs: &[f64]) -> f64 {
    probs.iter().filter(|&&p| p > 0.0).map(|&p| -p * p.ln()).sum()
}

fn collect_labels(
    logits: &[f32],
    targets: &[f32],
    rows: usize,
    width: usize,
    y_pred: &mut Vec<usize>,
    y_true: &mut Vec<usize>,
) {
    for r in 0..rows {
        y_pred.push(argmax(&logits[r * width..(r + 1) * width]));
        y_true.push(argmax(&targets[r * width..(r + 1) * width]));
    }
}

fn build_report(loss: f32, y_pred: &[usize], y_true: &[usize], n_classes: usize) -> EvalReport {
    let confusion = ConfusionMatrix::from_predictions(y_pred, y_true, n_classes);
    let metrics = MultiClassMetrics::from_confusion_matrix(&confusion);
    EvalReport {
        loss,
        accuracy: confusion.accuracy(),
        precision: metrics.precision_avg(Average::Weighted),
        recall: metrics.recall_avg(Average::Weighted),
        f1: metrics.f1_avg(Average::Weighted),
        confusion,
    }
}
