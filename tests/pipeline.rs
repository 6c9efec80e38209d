//! End-to-end: regularized training, best-checkpoint evaluation, and the
//! MC-dropout uncertainty path.

use afinar::checkpoint::CheckpointManager;
use afinar::config::ExperimentConfig;
use afinar::eval::{restore_best, Evaluator};
use afinar::model::{Network, SparseMlp};
use afinar::reg::{RegularizerConfig, SourceDistance};
use afinar::train::{InMemorySource, RunStatus, TrainLoop};
use tempfile::TempDir;

fn dataset() -> (Vec<Vec<f32>>, Vec<usize>) {
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for i in 0..16 {
        let jitter = (i as f32) * 0.02;
        rows.push(vec![0.9 + jitter, 0.1]);
        labels.push(0);
        rows.push(vec![0.1, 0.9 - jitter]);
        labels.push(1);
    }
    (rows, labels)
}

fn source() -> InMemorySource {
    let (rows, labels) = dataset();
    InMemorySource::from_rows(&rows, &labels, 2, 8).unwrap()
}

fn config(dir: &TempDir, regularizer: RegularizerConfig) -> ExperimentConfig {
    ExperimentConfig {
        checkpoint_dir: dir.path().to_path_buf(),
        max_epochs: 15,
        lr: 0.1,
        dropout_rate: 0.0,
        es_patience: 15,
        seed: 5,
        regularizer,
        ..Default::default()
    }
}

#[test]
fn hoyer_regularized_training_learns_and_evaluates() {
    let dir = TempDir::new().unwrap();
    let config = config(
        &dir,
        RegularizerConfig { kind: "hoyer_square".into(), alpha: 1e-3, beta: None },
    );

    let mut model = SparseMlp::new(&[2, 8, 2], 0.0, config.seed).unwrap();
    let outcome = {
        let mut engine =
            TrainLoop::new(&mut model, &config, CheckpointManager::new(dir.path())).unwrap();
        engine.run(&mut source(), &mut source())
    };

    assert_ne!(outcome.status, RunStatus::Failed);
    let history = &outcome.state.history;
    assert!(
        history.valid_loss.last().unwrap() < history.valid_loss.first().unwrap(),
        "validation loss did not improve: {:?}",
        history.valid_loss
    );

    // Evaluate the best checkpoint into a fresh model instance
    let mut eval_model = SparseMlp::new(&[2, 8, 2], 0.0, 1234).unwrap();
    let manager = CheckpointManager::new(dir.path());
    let best = restore_best(&manager, &mut eval_model).unwrap();
    assert!((best.valid_loss - outcome.best_valid_loss).abs() < 1e-6);

    let report = Evaluator.evaluate(&mut eval_model, &mut source()).unwrap();
    assert!(report.accuracy > 0.9, "accuracy {} on separable data", report.accuracy);
    assert!(report.f1 > 0.9);
}

#[test]
fn transformed_l1_with_source_distance_stays_near_reference() {
    let dir = TempDir::new().unwrap();
    let mut config = config(
        &dir,
        RegularizerConfig { kind: "transformed_l1".into(), alpha: 1e-3, beta: Some(0.5) },
    );
    config.source_strength = 1.0;
    config.momentum = 0.0;
    config.max_epochs = 5;

    let mut model = SparseMlp::new(&[2, 8, 2], 0.0, config.seed).unwrap();
    let reference = model.state();

    let outcome = {
        let engine =
            TrainLoop::new(&mut model, &config, CheckpointManager::new(dir.path())).unwrap();
        let mut engine = engine.with_source(SourceDistance::new(reference.tensors.clone()));
        engine.run(&mut source(), &mut source())
    };
    assert_ne!(outcome.status, RunStatus::Failed);

    // A strong pull toward the pretrained reference keeps parameters close
    let drift: f32 = model
        .state()
        .tensors
        .iter()
        .zip(reference.tensors.iter())
        .flat_map(|((_, now), (_, then))| now.iter().zip(then.iter()))
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    assert!(drift < 1.0, "parameters drifted {drift} from the reference");
}

#[test]
fn alpha_zero_contributes_nothing_for_every_strategy() {
    // With alpha = 0 the penalty term is exactly absent: runs under all
    // three strategies are indistinguishable from each other, while any
    // nonzero alpha changes the trajectory.
    let run = |kind: &str, beta: Option<f64>, alpha: f64| {
        let dir = TempDir::new().unwrap();
        let mut config =
            config(&dir, RegularizerConfig { kind: kind.into(), alpha, beta });
        config.max_epochs = 4;

        let mut model = SparseMlp::new(&[2, 8, 2], 0.0, config.seed).unwrap();
        let mut engine =
            TrainLoop::new(&mut model, &config, CheckpointManager::new(dir.path())).unwrap();
        engine.run(&mut source(), &mut source()).state
    };

    let l1 = run("l1", None, 0.0);
    let hoyer = run("hoyer_square", None, 0.0);
    let tl1 = run("transformed_l1", Some(0.01), 0.0);
    assert_eq!(l1, hoyer);
    assert_eq!(l1, tl1);

    let regularized = run("hoyer_square", None, 0.5);
    assert_ne!(l1.history.train_loss, regularized.history.train_loss);
}

#[test]
fn mc_uncertainty_on_trained_model() {
    let dir = TempDir::new().unwrap();
    let config = config(
        &dir,
        RegularizerConfig { kind: "l1".into(), alpha: 0.0, beta: None },
    );

    let mut model = SparseMlp::new(&[2, 8, 2], 0.3, config.seed).unwrap();
    {
        let mut engine =
            TrainLoop::new(&mut model, &config, CheckpointManager::new(dir.path())).unwrap();
        engine.run(&mut source(), &mut source());
    }

    let mut eval_model = SparseMlp::new(&[2, 8, 2], 0.3, 77).unwrap();
    let manager = CheckpointManager::new(dir.path());
    restore_best(&manager, &mut eval_model).unwrap();
    let params_before = eval_model.state();

    let (report, entropies) =
        Evaluator.evaluate_mc(&mut eval_model, &mut source(), 10).unwrap();

    assert_eq!(entropies.len(), dataset().0.len());
    let n_classes = 2f64;
    for &h in &entropies {
        assert!((0.0..=n_classes.ln() + 1e-9).contains(&h), "entropy {h} out of bounds");
    }
    assert!(report.loss.is_finite());

    // Repeated stochastic passes must not touch the loaded parameters
    assert_eq!(eval_model.state(), params_before);
}
