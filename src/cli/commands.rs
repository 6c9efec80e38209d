//! CLI command handlers

use tracing::warn;

use crate::checkpoint::CheckpointManager;
use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::eval::{restore_best, Evaluator, SweepRecord, SweepReport};
use crate::model::SparseMlp;
use crate::search::{ParameterDomain, ParameterValue, SearchLoop, SearchSpace, TpeSurrogate};
use crate::train::{RunStatus, TrainLoop};

use super::data::JsonDataset;
use super::{Cli, Command};

/// Dispatch a parsed CLI invocation
pub fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Train { config, train, valid } => {
            let config = ExperimentConfig::load(config)?;
            run_train(&config, &JsonDataset::load(train)?, &JsonDataset::load(valid)?)
        }
        Command::Search { config, train, valid, trials } => {
            let config = ExperimentConfig::load(config)?;
            run_search(&config, &JsonDataset::load(train)?, &JsonDataset::load(valid)?, trials)
        }
        Command::Evaluate { config, test, mc_passes } => {
            let config = ExperimentConfig::load(config)?;
            run_evaluate(&config, &JsonDataset::load(test)?, mc_passes)
        }
    }
}

fn model_dims(config: &ExperimentConfig, data: &JsonDataset) -> Vec<usize> {
    let mut dims = vec![data.input_dim()];
    dims.extend_from_slice(&config.hidden);
    dims.push(data.n_classes);
    dims
}

fn run_train(config: &ExperimentConfig, train: &JsonDataset, valid: &JsonDataset) -> Result<()> {
    let dims = model_dims(config, train);
    let mut model = SparseMlp::new(&dims, config.dropout_rate, config.seed)?;

    let mut engine =
        TrainLoop::new(&mut model, config, CheckpointManager::new(&config.checkpoint_dir))?;
    let outcome = engine.run(
        &mut train.source(config.batch_size)?,
        &mut valid.source(config.batch_size)?,
    );

    let status = match outcome.status {
        RunStatus::Completed => "completed",
        RunStatus::EarlyStopped => "stopped early",
        RunStatus::Failed => "failed",
    };
    println!(
        "run {status} after {} epochs, best validation loss {:.4}",
        outcome.state.epoch, outcome.best_valid_loss
    );
    Ok(())
}

fn run_search(
    config: &ExperimentConfig,
    train: &JsonDataset,
    valid: &JsonDataset,
    trials: usize,
) -> Result<()> {
    let dims = model_dims(config, train);
    // Validate the architecture once, before the trial loop
    SparseMlp::new(&dims, config.dropout_rate, config.seed)?;

    let mut space = SearchSpace::new();
    space.add("lr", ParameterDomain::Continuous { low: 1e-4, high: 1e-1, log_scale: true });
    space.add("alpha", ParameterDomain::Continuous { low: 1e-4, high: 1.0, log_scale: true });

    let log_path = config.results_dir.join("search_results.csv");
    let mut search =
        SearchLoop::new(space, Box::new(TpeSurrogate::new()), &log_path, config.seed)?;

    let mut trial_no = search.trials().len();
    let best = search.run(trials, |vector: &[ParameterValue]| {
        let mut trial_config = config.clone();
        trial_config.lr = vector[0].as_float().expect("lr dimension is continuous") as f32;
        trial_config.regularizer.alpha = vector[1].as_float().expect("alpha dimension is continuous");
        trial_config.checkpoint_dir = config.checkpoint_dir.join(format!("trial_{trial_no}"));
        trial_no += 1;

        let manager = CheckpointManager::new(&trial_config.checkpoint_dir);
        let mut model = match SparseMlp::new(&dims, trial_config.dropout_rate, trial_config.seed)
        {
            Ok(model) => model,
            Err(e) => {
                warn!(error = %e, "trial setup failed");
                return f64::INFINITY;
            }
        };
        let mut sources = match (
            train.source(trial_config.batch_size),
            valid.source(trial_config.batch_size),
        ) {
            (Ok(t), Ok(v)) => (t, v),
            _ => return f64::INFINITY,
        };

        match TrainLoop::new(&mut model, &trial_config, manager) {
            Ok(mut engine) => engine.run(&mut sources.0, &mut sources.1).best_valid_loss as f64,
            Err(e) => {
                warn!(error = %e, "trial setup failed");
                f64::INFINITY
            }
        }
    })?;

    match best {
        Some(trial) => println!(
            "best trial: lr={}, alpha={}, validation loss {:.4} ({} trials logged at {})",
            trial.vector[0],
            trial.vector[1],
            trial.objective,
            search.trials().len(),
            log_path.display()
        ),
        None => println!("no trial produced a finite objective"),
    }
    Ok(())
}

fn run_evaluate(
    config: &ExperimentConfig,
    test: &JsonDataset,
    mc_passes: Option<usize>,
) -> Result<()> {
    let dims = model_dims(config, test);
    let mut model = SparseMlp::new(&dims, config.dropout_rate, config.seed)?;

    let manager = CheckpointManager::new(&config.checkpoint_dir);
    restore_best(&manager, &mut model)?;

    let mut data = test.source(config.batch_size)?;
    let report = match mc_passes {
        Some(passes) => {
            let (report, entropies) = Evaluator.evaluate_mc(&mut model, &mut data, passes)?;
            let mean_entropy = entropies.iter().sum::<f64>() / entropies.len() as f64;
            println!("mean predictive entropy over {} inputs: {mean_entropy:.4}", entropies.len());
            report
        }
        None => Evaluator.evaluate(&mut model, &mut data)?,
    };

    println!(
        "loss {:.4}  accuracy {:.4}  precision {:.4}  recall {:.4}  f1 {:.4}",
        report.loss, report.accuracy, report.precision, report.recall, report.f1
    );

    let sweep = SweepReport::new(config.results_dir.join("final_metrics.csv"));
    sweep.write(&[SweepRecord::new(&config.regularizer, &report)])?;
    Ok(())
}
