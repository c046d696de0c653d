use std::sync::atomic::Ordering;
use std::time::Instant;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::data::dataset::DigitSet;
use crate::error::{Error, Result};
use crate::loss::SparseCrossEntropyLoss;
use crate::math::argmax;
use crate::network::network::{Gradients, Network};
use crate::optim::Optimizer;
use crate::train::callbacks::{EarlyStopping, ReduceLrOnPlateau};
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainConfig;

/// Samples per rayon task. Chunks are summed in order, so results do not
/// depend on how the pool schedules them.
const CHUNK: usize = 8;

/// Trains `network` for up to `config.epochs` epochs and returns the stats of
/// every completed epoch.
///
/// # Arguments
/// - `network` - modified in place
/// - `train` - samples the optimizer fits
/// - `val` - optional held-out samples; monitored by the callbacks when present
/// - `optimizer` - applies the averaged gradient of every mini-batch
/// - `config` - hyperparameters, callbacks, optional progress channel and stop flag
///
/// # Early termination
/// The loop breaks early if:
/// - early stopping fires,
/// - the `progress_tx` receiver has been dropped, **or**
/// - `config.stop_flag` is set to `true`.
pub fn train_loop<O: Optimizer>(
    network: &mut Network,
    train: &DigitSet,
    val: Option<&DigitSet>,
    optimizer: &mut O,
    config: &TrainConfig,
) -> Result<Vec<EpochStats>> {
    if train.is_empty() {
        return Err(Error::InvalidData("training set is empty".into()));
    }
    if config.batch_size == 0 {
        return Err(Error::InvalidData("batch_size must be at least 1".into()));
    }
    let val = val.filter(|v| !v.is_empty());

    let mut early_stopping = config.early_stopping.map(EarlyStopping::new);
    let mut reduce_lr = config.reduce_lr.map(ReduceLrOnPlateau::new);
    let mut shuffle_rng = StdRng::seed_from_u64(config.seed);
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        if stop_requested(config) {
            break;
        }

        let t_start = Instant::now();
        let learning_rate = optimizer.learning_rate() as f64;

        let (train_loss, train_accuracy) =
            run_one_epoch(network, train, optimizer, config, epoch, &mut shuffle_rng);

        let (val_loss, val_accuracy) = match val {
            Some(v) => {
                let (loss, acc) = evaluate(network, v)?;
                (Some(loss), Some(acc))
            }
            None => (None, None),
        };

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            train_accuracy,
            val_loss,
            val_accuracy,
            learning_rate,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        info!("{}", format_stats(&stats));

        let monitored = stats.monitored_loss();
        history.push(stats.clone());

        if let Some(ref tx) = config.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats).is_err() {
                break;
            }
        }

        if let Some(ref mut sched) = reduce_lr {
            if let Some(new_lr) = sched.on_epoch_end(monitored, learning_rate) {
                info!("Reducing learning rate to {:.3e}", new_lr);
                optimizer.set_learning_rate(new_lr as f32);
            }
        }

        if let Some(ref mut stopper) = early_stopping {
            if stopper.on_epoch_end(epoch, monitored, network) {
                info!("Early stopping after epoch {}", epoch);
                break;
            }
        }
    }

    if let Some(ref mut stopper) = early_stopping {
        stopper.restore(network);
    }

    Ok(history)
}

fn stop_requested(config: &TrainConfig) -> bool {
    config.stop_flag.as_ref().map_or(false, |flag| flag.load(Ordering::Relaxed))
}

/// Runs one full epoch of mini-batch Adam over the training data.
/// Returns the mean loss and accuracy over all samples, measured during the
/// training forward passes.
fn run_one_epoch<O: Optimizer>(
    network: &mut Network,
    train: &DigitSet,
    optimizer: &mut O,
    config: &TrainConfig,
    epoch: usize,
    shuffle_rng: &mut StdRng,
) -> (f64, f64) {
    let n = train.len();
    let mut total_loss = 0.0f64;
    let mut correct = 0usize;

    // Shuffle sample order each epoch.
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(shuffle_rng);

    for (batch_no, batch) in indices.chunks(config.batch_size).enumerate() {
        let net: &Network = network;
        let seed = config.seed;
        let partials: Vec<(Gradients, f64, usize)> = batch
            .par_chunks(CHUNK)
            .map(|chunk| {
                let mut grads = net.zero_grads();
                let mut loss = 0.0f64;
                let mut hits = 0;
                for &idx in chunk {
                    let mut rng = StdRng::seed_from_u64(sample_seed(seed, epoch, idx));
                    let label = train.labels[idx] as usize;
                    let (output, caches) = net.forward_train(train.tensor(idx), &mut rng);

                    loss += SparseCrossEntropyLoss::loss(&output, label) as f64;
                    if argmax(&output) == label {
                        hits += 1;
                    }
                    let delta = SparseCrossEntropyLoss::derivative(&output, label);
                    net.backward(&caches, delta, &mut grads);
                }
                (grads, loss, hits)
            })
            .collect();

        let mut partials = partials.into_iter();
        let Some((mut grads, mut batch_loss, mut batch_hits)) = partials.next() else { continue };
        for (g, loss, hits) in partials {
            grads.add(&g);
            batch_loss += loss;
            batch_hits += hits;
        }

        // Average and apply.
        grads.scale(1.0 / batch.len() as f32);
        optimizer.step(network, &grads);

        debug!("epoch {} batch {}: loss {:.4}", epoch, batch_no + 1, batch_loss / batch.len() as f64);
        total_loss += batch_loss;
        correct += batch_hits;
    }

    (total_loss / n as f64, correct as f64 / n as f64)
}

/// Dropout mask seed for one sample in one epoch.
fn sample_seed(seed: u64, epoch: usize, idx: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (epoch as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ idx as u64
}

/// Mean loss and accuracy over a full dataset in inference mode.
pub fn evaluate(network: &Network, set: &DigitSet) -> Result<(f64, f64)> {
    let n = set.len();
    if n == 0 {
        return Ok((0.0, 0.0));
    }
    let per_sample = (0..n)
        .into_par_iter()
        .map(|i| {
            let output = network.predict(&set.tensor(i))?;
            let label = set.labels[i] as usize;
            Ok((SparseCrossEntropyLoss::loss(&output, label) as f64, argmax(&output) == label))
        })
        .collect::<Result<Vec<(f64, bool)>>>()?;

    let total: f64 = per_sample.iter().map(|(loss, _)| loss).sum();
    let correct = per_sample.iter().filter(|(_, hit)| *hit).count();
    Ok((total / n as f64, correct as f64 / n as f64))
}

fn format_stats(stats: &EpochStats) -> String {
    let mut line = format!(
        "Epoch {}/{} - {}ms - loss: {:.4} - accuracy: {:.4}",
        stats.epoch, stats.total_epochs, stats.elapsed_ms, stats.train_loss, stats.train_accuracy
    );
    if let (Some(loss), Some(acc)) = (stats.val_loss, stats.val_accuracy) {
        line.push_str(&format!(" - val_loss: {:.4} - val_accuracy: {:.4}", loss, acc));
    }
    line.push_str(&format!(" - learning_rate: {:.1e}", stats.learning_rate));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Arc, atomic::AtomicBool};

    use crate::data::IMAGE_PIXELS;
    use crate::optim::Adam;
    use crate::train::train_config::EarlyStoppingConfig;

    /// Two trivially separable classes: dark images are 0s, bright images are 1s.
    fn two_class_set(n: usize) -> DigitSet {
        let labels: Vec<u8> = (0..n).map(|i| (i % 2) as u8).collect();
        let images = labels.iter()
            .flat_map(|&l| std::iter::repeat(if l == 0 { 0.05 } else { 0.9 }).take(IMAGE_PIXELS))
            .collect();
        DigitSet::new(images, labels).unwrap()
    }

    #[test]
    fn loss_decreases_on_separable_data() {
        let set = two_class_set(32);
        let mut network = Network::digit_classifier(&mut StdRng::seed_from_u64(42));
        let mut adam = Adam::new(0.001);
        let mut config = TrainConfig::new(4, 8, 0.001);
        config.early_stopping = None;
        config.reduce_lr = None;

        let history = train_loop(&mut network, &set, None, &mut adam, &config).unwrap();
        assert_eq!(history.len(), 4);
        assert!(history[3].train_loss < history[0].train_loss);

        let (_, accuracy) = evaluate(&network, &set).unwrap();
        assert!(accuracy > 0.9);
    }

    #[test]
    fn progress_channel_receives_every_epoch() {
        let set = two_class_set(8);
        let mut network = Network::digit_classifier(&mut StdRng::seed_from_u64(1));
        let mut adam = Adam::new(0.001);
        let (tx, rx) = mpsc::channel();
        let mut config = TrainConfig::new(2, 4, 0.001);
        config.progress_tx = Some(tx);

        train_loop(&mut network, &set, Some(&two_class_set(4)), &mut adam, &config).unwrap();
        let received: Vec<EpochStats> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|s| s.val_loss.is_some()));
    }

    #[test]
    fn stop_flag_prevents_training() {
        let set = two_class_set(4);
        let mut network = Network::digit_classifier(&mut StdRng::seed_from_u64(1));
        let mut adam = Adam::new(0.001);
        let mut config = TrainConfig::new(5, 4, 0.001);
        config.stop_flag = Some(Arc::new(AtomicBool::new(true)));

        let history = train_loop(&mut network, &set, None, &mut adam, &config).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn zero_patience_stops_after_first_non_improvement() {
        let set = two_class_set(4);
        let mut network = Network::digit_classifier(&mut StdRng::seed_from_u64(3));
        // A zero learning rate leaves validation loss flat after epoch 1.
        let mut adam = Adam::new(0.0);
        let mut config = TrainConfig::new(10, 4, 0.0);
        config.early_stopping = Some(EarlyStoppingConfig { patience: 1, ..Default::default() });

        let history = train_loop(&mut network, &set, Some(&set), &mut adam, &config).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn rejects_empty_training_set_and_zero_batch() {
        let mut network = Network::digit_classifier(&mut StdRng::seed_from_u64(3));
        let mut adam = Adam::new(0.001);
        let config = TrainConfig::new(1, 4, 0.001);
        assert!(train_loop(&mut network, &DigitSet::default(), None, &mut adam, &config).is_err());

        let config = TrainConfig::new(1, 0, 0.001);
        assert!(train_loop(&mut network, &two_class_set(2), None, &mut adam, &config).is_err());
    }
}
