//! Training loop engine
//!
//! One resumable train/validate epoch cycle: loss composition (task loss +
//! scaled activation penalty + optional distance-from-source penalty),
//! plateau learning-rate decay, strict-improvement tracking with best
//! checkpointing, periodic latest checkpointing, and early stopping.
//!
//! `run` is the failure boundary: whatever goes wrong inside a run is
//! logged and surfaced as an infinite objective so a driving search loop
//! can treat the trial as maximally bad and continue.

use ndarray::Array1;
use tracing::{info, warn};

use crate::autograd::{add, backward, scale, Tensor};
use crate::checkpoint::{BestCheckpoint, CheckpointManager, LatestCheckpoint, Resume};
use crate::config::ExperimentConfig;
use crate::error::{Error, Result};
use crate::model::{ForwardMode, Network};
use crate::optim::{Optimizer, ReduceLrOnPlateau, Sgd};
use crate::reg::{Regularizer, SourceDistance};

use super::batch::BatchSource;
use super::loss::CrossEntropyLoss;
use super::state::TrainingState;

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    EarlyStopped,
    Failed,
}

/// Result of one training run
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub best_valid_loss: f32,
    pub state: TrainingState,
}

/// One resumable training run over a [`Network`]
pub struct TrainLoop<'a, N: Network> {
    model: &'a mut N,
    config: &'a ExperimentConfig,
    optimizer: Box<dyn Optimizer>,
    scheduler: ReduceLrOnPlateau,
    loss_fn: CrossEntropyLoss,
    regularizer: Box<dyn Regularizer>,
    source: Option<SourceDistance>,
    checkpoints: CheckpointManager,
    state: TrainingState,
}

impl<'a, N: Network> TrainLoop<'a, N> {
    /// Set up a run, resuming from a latest checkpoint when one exists.
    ///
    /// Configuration problems (bad bounds, unrecognized regularizer kind)
    /// fail here, before the run boundary; they are never converted to an
    /// infinite objective.
    pub fn new(
        model: &'a mut N,
        config: &'a ExperimentConfig,
        checkpoints: CheckpointManager,
    ) -> Result<Self> {
        config.validate()?;
        let regularizer = config.regularizer.build()?;

        let mut optimizer: Box<dyn Optimizer> =
            Box::new(Sgd::new(config.lr, config.momentum));
        let mut scheduler =
            ReduceLrOnPlateau::new(config.lr_factor, config.lr_patience, config.min_lr);

        let state = match checkpoints.load_if_present()? {
            Resume::Fresh => TrainingState::new(),
            Resume::Restored(ck) => {
                model.load_state(&ck.model)?;
                optimizer.load_state(ck.optimizer)?;
                scheduler.load_state(ck.scheduler);
                info!(epoch = ck.state.epoch, "resuming from latest checkpoint");
                ck.state
            }
        };

        Ok(Self {
            model,
            config,
            optimizer,
            scheduler,
            loss_fn: CrossEntropyLoss,
            regularizer,
            source: None,
            checkpoints,
            state,
        })
    }

    /// Add a distance-from-source penalty against a pretrained reference
    pub fn with_source(mut self, source: SourceDistance) -> Self {
        self.source = Some(source);
        self
    }

    /// Bookkeeping of the run so far
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Execute the run. This is the failure boundary: errors inside the
    /// run are logged and returned as an infinite best loss, not raised.
    pub fn run(
        &mut self,
        train: &mut dyn BatchSource,
        valid: &mut dyn BatchSource,
    ) -> RunOutcome {
        match self.try_run(train, valid) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "training run failed, surfacing infinite loss");
                RunOutcome {
                    status: RunStatus::Failed,
                    best_valid_loss: f32::INFINITY,
                    state: self.state.clone(),
                }
            }
        }
    }

    fn try_run(
        &mut self,
        train: &mut dyn BatchSource,
        valid: &mut dyn BatchSource,
    ) -> Result<RunOutcome> {
        while self.state.epoch < self.config.max_epochs {
            let (train_loss, train_acc) = self.train_epoch(train)?;
            let (valid_loss, valid_acc) = self.validate_epoch(valid)?;

            self.scheduler.step(valid_loss, self.optimizer.as_mut());
            self.state
                .record_epoch(train_loss, train_acc, valid_loss, valid_acc, self.optimizer.lr());

            if self.state.observe(valid_loss) {
                self.save_best(valid_loss)?;
            }
            self.state.epoch += 1;

            if self.state.epoch % self.config.checkpoint_interval == 0 {
                self.save_latest()?;
            }

            info!(
                epoch = self.state.epoch,
                train_loss,
                valid_loss,
                valid_acc,
                lr = self.optimizer.lr(),
                "epoch complete"
            );

            if self.state.epochs_since_improvement >= self.config.es_patience {
                info!(
                    epoch = self.state.epoch,
                    best = self.state.best_valid_loss,
                    "early stopping, no improvement for {} epochs",
                    self.config.es_patience
                );
                return Ok(self.outcome(RunStatus::EarlyStopped));
            }
        }
        Ok(self.outcome(RunStatus::Completed))
    }

    fn train_epoch(&mut self, source: &mut dyn BatchSource) -> Result<(f32, f32)> {
        let mut params = self.model.params();
        let mut total_loss = 0.0f32;
        let mut num_batches = 0usize;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for batch in source.batches() {
            self.optimizer.zero_grad(&mut params);

            let logits = self.model.forward(&batch.inputs, batch.rows, ForwardMode::Train);
            let task = self.loss_fn.forward(&logits, &batch.targets, batch.rows);
            let loss = self.compose_loss(task);

            let loss_val = loss.data()[0];
            if !loss_val.is_finite() {
                return Err(Error::State(format!("training loss diverged to {loss_val}")));
            }

            backward(&loss);
            self.optimizer.step(&mut params);

            total_loss += loss_val;
            num_batches += 1;
            correct += correct_count(
                &logits.data(),
                &batch.targets.data(),
                batch.rows,
                self.model.n_classes(),
            );
            seen += batch.rows;
        }

        if num_batches == 0 {
            return Err(Error::State("training batch source yielded no data".to_string()));
        }
        Ok((total_loss / num_batches as f32, correct as f32 / seen as f32))
    }

    /// Validation reports task loss only: no parameter update, no
    /// regularizer term.
    fn validate_epoch(&mut self, source: &mut dyn BatchSource) -> Result<(f32, f32)> {
        let mut total_loss = 0.0f32;
        let mut num_batches = 0usize;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for batch in source.batches() {
            let logits = self.model.forward(&batch.inputs, batch.rows, ForwardMode::Eval);
            let loss = self.loss_fn.forward(&logits, &batch.targets, batch.rows);

            let loss_val = loss.data()[0];
            if !loss_val.is_finite() {
                return Err(Error::State(format!("validation loss diverged to {loss_val}")));
            }

            total_loss += loss_val;
            num_batches += 1;
            correct += correct_count(
                &logits.data(),
                &batch.targets.data(),
                batch.rows,
                self.model.n_classes(),
            );
            seen += batch.rows;
        }

        if num_batches == 0 {
            return Err(Error::State("validation batch source yielded no data".to_string()));
        }
        Ok((total_loss / num_batches as f32, correct as f32 / seen as f32))
    }

    fn compose_loss(&mut self, task: Tensor) -> Tensor {
        let mut loss = task;

        let alpha = self.config.regularizer.alpha as f32;
        if alpha != 0.0 {
            let taps = self.model.taps();
            if !taps.is_empty() {
                let penalty = self.regularizer.penalty(&taps);
                // Penalty on the left: its staged gradients must land in
                // the tap grad cells before the task branch walks the
                // graph and carries them the rest of the way.
                loss = add(&scale(&penalty, alpha), &loss);
            }
        }

        if self.config.source_strength > 0.0 {
            if let Some(source) = &self.source {
                let penalty = source.penalty(&self.model.named_params());
                loss = add(&scale(&penalty, self.config.source_strength), &loss);
            }
        }

        loss
    }

    fn save_best(&self, valid_loss: f32) -> Result<()> {
        self.checkpoints.save_best(&BestCheckpoint::new(
            self.model.state(),
            valid_loss,
            self.config.dropout_rate,
            self.config.regularizer.alpha,
        ))
    }

    fn save_latest(&self) -> Result<()> {
        self.checkpoints.save_latest(&LatestCheckpoint::new(
            self.model.state(),
            self.optimizer.state(),
            self.scheduler.state(),
            self.state.clone(),
        ))
    }

    fn outcome(&self, status: RunStatus) -> RunOutcome {
        RunOutcome {
            status,
            best_valid_loss: self.state.best_valid_loss,
            state: self.state.clone(),
        }
    }
}

/// Count rows whose argmax prediction matches the one-hot target
pub(crate) fn correct_count(
    logits: &Array1<f32>,
    targets: &Array1<f32>,
    rows: usize,
    width: usize,
) -> usize {
    let mut correct = 0;
    for r in 0..rows {
        let row = &logits.as_slice().expect("contiguous")[r * width..(r + 1) * width];
        let target_row = &targets.as_slice().expect("contiguous")[r * width..(r + 1) * width];
        if argmax(row) == argmax(target_row) {
            correct += 1;
        }
    }
    correct
}

pub(crate) fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
