//! Sequential model-based search loop

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::Result;

use super::log::{Trial, TrialLog};
use super::space::{ParameterValue, SearchSpace};
use super::surrogate::Surrogate;

/// Ask/tell search loop with a crash-safe trial log.
///
/// Each iteration proposes one vector, evaluates it, and, when the
/// objective is finite, updates the surrogate, appends the trial, and
/// rewrites the durable log. Infinite objectives (failed training runs)
/// are excluded from both the surrogate and the log; the loop continues.
/// On construction an existing log is loaded and replayed into the
/// surrogate so a restarted search re-runs no completed work.
pub struct SearchLoop {
    space: SearchSpace,
    surrogate: Box<dyn Surrogate>,
    log: TrialLog,
    trials: Vec<Trial>,
    rng: StdRng,
}

impl SearchLoop {
    /// Validate the space, then load and replay any persisted trials
    pub fn new(
        space: SearchSpace,
        mut surrogate: Box<dyn Surrogate>,
        log_path: impl Into<PathBuf>,
        seed: u64,
    ) -> Result<Self> {
        space.validate()?;
        let log = TrialLog::new(log_path);

        let trials = log.load(&space)?;
        for trial in &trials {
            surrogate.tell(&trial.vector, trial.objective);
        }
        if !trials.is_empty() {
            info!(n = trials.len(), "resumed search from persisted trial log");
        }

        Ok(Self { space, surrogate, log, trials, rng: StdRng::seed_from_u64(seed) })
    }

    /// Completed (finite-objective) trials so far, in order
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    /// Run until `n_trials` trials have been attempted in total.
    ///
    /// Trials restored from the log count toward the budget; a failed
    /// trial consumes its iteration but is not persisted, so a crash-resume
    /// may attempt it again.
    pub fn run<F>(&mut self, n_trials: usize, mut objective: F) -> Result<Option<Trial>>
    where
        F: FnMut(&[ParameterValue]) -> f64,
    {
        for trial_index in self.trials.len()..n_trials {
            let vector = self.surrogate.ask(&self.space, &mut self.rng);
            let value = objective(&vector);

            if value.is_finite() {
                self.surrogate.tell(&vector, value);
                self.trials.push(Trial::new(vector, value));
                self.log.rewrite(&self.space, &self.trials)?;
                info!(trial = trial_index, objective = value, "trial complete");
            } else {
                warn!(
                    trial = trial_index,
                    vector = %format_vector(&vector),
                    "trial failed, excluding it from the surrogate and the log"
                );
            }
        }
        Ok(self.best().cloned())
    }

    /// Best trial: minimum objective, earliest index on ties
    pub fn best(&self) -> Option<&Trial> {
        self.trials
            .iter()
            .reduce(|best, t| if t.objective < best.objective { t } else { best })
    }
}

fn format_vector(vector: &[ParameterValue]) -> String {
    vector.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}
