use std::panic;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::dataset::PreparedDataset;
use crate::error::{Error, Result};
use crate::network::network::Network;
use crate::optim::Adam;
use crate::train::epoch_stats::EpochStats;
use crate::train::loop_fn::{evaluate, train_loop};
use crate::train::tracker::ExperimentTracker;
use crate::train::train_config::TrainConfig;

pub const MODEL_FILE: &str = "model.json";

/// What a training run produced.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub train_samples: usize,
    pub val_samples: usize,
    pub test_samples: usize,
    pub history: Vec<EpochStats>,
    pub test_loss: f64,
    pub test_accuracy: f64,
    pub model_path: PathBuf,
}

/// Loads the prepared arrays from `input_dir`, fits the digit classifier and
/// writes `<model_output>/model.json`.
///
/// The tracker run opens once the arrays are loaded and is closed on every
/// later exit path, failed runs included. Per-epoch metrics reach the tracker
/// as each epoch completes.
pub fn run_training(
    input_dir: &Path,
    model_output: &Path,
    config: &TrainConfig,
    tracker: &mut dyn ExperimentTracker,
) -> Result<TrainingReport> {
    info!("Loading data from {}", input_dir.display());
    let dataset = PreparedDataset::load(input_dir)?;
    info!("Training samples: {}", dataset.train.len());
    info!("Test samples: {}", dataset.test.len());

    tracked(tracker.start_run());
    let report = fit_and_save(&dataset, model_output, config, tracker);
    if let Err(e) = &report {
        tracked(tracker.log_param("failure", &e.to_string()));
    }
    tracked(tracker.end_run());
    report
}

fn fit_and_save(
    dataset: &PreparedDataset,
    model_output: &Path,
    config: &TrainConfig,
    tracker: &mut dyn ExperimentTracker,
) -> Result<TrainingReport> {
    let (fit, val) = dataset.train.split_tail(config.validation_split);
    if fit.is_empty() {
        return Err(Error::ShapeMismatch(format!(
            "{} training samples leave none to fit after a {} validation split",
            dataset.train.len(), config.validation_split
        )));
    }
    info!("Fitting on {} samples, validating on {}", fit.len(), val.len());

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut network = Network::digit_classifier(&mut rng);
    for line in network.summary() {
        info!("{}", line);
    }

    tracked(tracker.log_param("epochs", &config.epochs.to_string()));
    tracked(tracker.log_param("batch_size", &config.batch_size.to_string()));
    tracked(tracker.log_param("learning_rate", &config.learning_rate.to_string()));

    info!("Training model for {} epochs", config.epochs);
    let mut optimizer = Adam::new(config.learning_rate);
    let val_set = if val.is_empty() { None } else { Some(&val) };

    // The loop runs on a scoped thread and reports each epoch over a channel;
    // this thread records it and forwards it to the caller's own receiver.
    let (tx, rx) = mpsc::channel();
    let loop_config = TrainConfig {
        epochs: config.epochs,
        batch_size: config.batch_size,
        learning_rate: config.learning_rate,
        validation_split: config.validation_split,
        seed: config.seed,
        early_stopping: config.early_stopping,
        reduce_lr: config.reduce_lr,
        progress_tx: Some(tx),
        stop_flag: config.stop_flag.clone(),
    };
    let (net, opt, fit_set) = (&mut network, &mut optimizer, &fit);
    let history = thread::scope(|scope| {
        let worker = scope.spawn(move || train_loop(net, fit_set, val_set, opt, &loop_config));
        for stats in rx {
            log_epoch(tracker, &stats);
            if let Some(outer) = &config.progress_tx {
                if outer.send(stats).is_err() {
                    break;
                }
            }
        }
        match worker.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    })?;

    info!("Evaluating model on test set");
    let (test_loss, test_accuracy) = evaluate(&network, &dataset.test)?;
    info!("Test Loss: {:.4}", test_loss);
    info!("Test Accuracy: {:.4}", test_accuracy);
    tracked(tracker.log_metric("test_loss", test_loss, None));
    tracked(tracker.log_metric("test_accuracy", test_accuracy, None));

    std::fs::create_dir_all(model_output)?;
    let model_path = model_output.join(MODEL_FILE);
    info!("Saving model to {}", model_path.display());
    network.save_json(&model_path)?;

    Ok(TrainingReport {
        train_samples: fit.len(),
        val_samples: val.len(),
        test_samples: dataset.test.len(),
        history,
        test_loss,
        test_accuracy,
        model_path,
    })
}

fn log_epoch(tracker: &mut dyn ExperimentTracker, stats: &EpochStats) {
    let step = Some(stats.epoch);
    tracked(tracker.log_metric("loss", stats.train_loss, step));
    tracked(tracker.log_metric("accuracy", stats.train_accuracy, step));
    if let (Some(loss), Some(acc)) = (stats.val_loss, stats.val_accuracy) {
        tracked(tracker.log_metric("val_loss", loss, step));
        tracked(tracker.log_metric("val_accuracy", acc, step));
    }
    tracked(tracker.log_metric("learning_rate", stats.learning_rate, step));
}

/// Tracking is best-effort.
fn tracked(result: Result<()>) {
    if let Err(e) = result {
        warn!("Experiment tracking failed: {}", e);
    }
}
