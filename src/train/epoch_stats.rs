use serde::{Serialize, Deserialize};

/// Per-epoch training statistics emitted by `train_loop`.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the training
/// loop sends one `EpochStats` value at the end of every completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Maximum epochs requested for this run.
    pub total_epochs: usize,
    /// Mean training loss over all samples in this epoch (dropout active).
    pub train_loss: f64,
    /// Training accuracy as a fraction in [0, 1].
    pub train_accuracy: f64,
    /// Mean validation loss, if a validation set was provided.
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    /// Learning rate used during this epoch.
    pub learning_rate: f64,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

impl EpochStats {
    /// The loss callbacks watch: validation loss when available.
    pub fn monitored_loss(&self) -> f64 {
        self.val_loss.unwrap_or(self.train_loss)
    }
}
