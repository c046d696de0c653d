use log::info;

use crate::layers::Layer;
use crate::network::network::Network;
use crate::train::train_config::{EarlyStoppingConfig, ReduceLrConfig};

/// Tracks the best monitored loss and how long it has gone without improving.
#[derive(Debug, Clone)]
struct Plateau {
    best: f64,
    wait: usize,
}

impl Plateau {
    fn new() -> Plateau {
        Plateau { best: f64::INFINITY, wait: 0 }
    }

    /// Returns `true` when `loss` is a new best.
    fn observe(&mut self, loss: f64, min_delta: f64) -> bool {
        if loss < self.best - min_delta {
            self.best = loss;
            self.wait = 0;
            true
        } else {
            self.wait += 1;
            false
        }
    }
}

pub struct EarlyStopping {
    config: EarlyStoppingConfig,
    plateau: Plateau,
    best_epoch: Option<usize>,
    best_layers: Option<Vec<Layer>>,
}

impl EarlyStopping {
    pub fn new(config: EarlyStoppingConfig) -> EarlyStopping {
        EarlyStopping { config, plateau: Plateau::new(), best_epoch: None, best_layers: None }
    }

    /// Records the epoch's loss; returns `true` when training should stop.
    pub fn on_epoch_end(&mut self, epoch: usize, loss: f64, network: &Network) -> bool {
        if self.plateau.observe(loss, self.config.min_delta) {
            self.best_epoch = Some(epoch);
            if self.config.restore_best_weights {
                self.best_layers = Some(network.layers.clone());
            }
            return false;
        }
        self.plateau.wait >= self.config.patience
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Puts the best weights seen back into `network`, if they were kept.
    pub fn restore(&mut self, network: &mut Network) {
        if let (Some(layers), Some(epoch)) = (self.best_layers.take(), self.best_epoch) {
            info!("Restoring weights from epoch {} (loss {:.4})", epoch, self.plateau.best);
            network.layers = layers;
        }
    }
}

pub struct ReduceLrOnPlateau {
    config: ReduceLrConfig,
    plateau: Plateau,
}

impl ReduceLrOnPlateau {
    pub fn new(config: ReduceLrConfig) -> ReduceLrOnPlateau {
        ReduceLrOnPlateau { config, plateau: Plateau::new() }
    }

    /// Returns the new learning rate when this epoch triggers a reduction.
    pub fn on_epoch_end(&mut self, loss: f64, learning_rate: f64) -> Option<f64> {
        if self.plateau.observe(loss, self.config.min_delta) || self.plateau.wait < self.config.patience {
            return None;
        }
        self.plateau.wait = 0;
        if learning_rate <= self.config.min_lr {
            return None;
        }
        Some((learning_rate * self.config.factor).max(self.config.min_lr))
    }
}
