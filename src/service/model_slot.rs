use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::network::network::Network;

/// Anything that maps one `(28, 28, 1)` input to class probabilities.
pub trait DigitModel: Send + Sync {
    fn predict(&self, input: &Tensor) -> Result<Vec<f32>>;
}

impl DigitModel for Network {
    fn predict(&self, input: &Tensor) -> Result<Vec<f32>> {
        Network::predict(self, input)
    }
}

/// Produces a ready model; called at most once per load attempt.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn DigitModel>>;
}

/// Loads a `Network` saved by the trainer.
#[derive(Debug, Clone)]
pub struct FileModelLoader {
    pub path: PathBuf,
}

impl FileModelLoader {
    pub fn new(path: impl Into<PathBuf>) -> FileModelLoader {
        FileModelLoader { path: path.into() }
    }
}

impl ModelLoader for FileModelLoader {
    fn load(&self) -> Result<Arc<dyn DigitModel>> {
        info!("Loading model from {}", self.path.display());
        let network = Network::load_json(&self.path)?;
        info!("Model loaded: {} ({} parameters)", network.name, network.parameter_count());
        Ok(Arc::new(network))
    }
}

/// Readiness of the process-wide model.
///
/// `Unloaded -> Loading -> Ready | Failed`; a request arriving while `Failed`
/// starts a new attempt.
pub enum ModelState {
    Unloaded,
    Loading,
    Ready(Arc<dyn DigitModel>),
    Failed(String),
}

/// Holds the model and serializes load attempts.
///
/// Exactly one caller performs a given load; callers arriving while it runs
/// block on the condvar and receive that same outcome.
pub struct ModelSlot {
    state: Mutex<ModelState>,
    changed: Condvar,
    loader: Box<dyn ModelLoader>,
    attempts: AtomicUsize,
}

impl ModelSlot {
    pub fn new(loader: Box<dyn ModelLoader>) -> ModelSlot {
        ModelSlot {
            state: Mutex::new(ModelState::Unloaded),
            changed: Condvar::new(),
            loader,
            attempts: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ModelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.lock(), ModelState::Ready(_))
    }

    /// Number of load attempts started so far.
    pub fn load_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns the ready model, loading it first if needed.
    pub fn get_or_load(&self) -> Result<Arc<dyn DigitModel>> {
        let mut state = self.lock();
        let mut waited = false;
        loop {
            match &*state {
                ModelState::Ready(model) => return Ok(Arc::clone(model)),
                ModelState::Failed(msg) if waited => return Err(Error::ModelLoad(msg.clone())),
                ModelState::Unloaded | ModelState::Failed(_) => break,
                ModelState::Loading => {}
            }
            waited = true;
            state = self.changed.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        *state = ModelState::Loading;
        drop(state);

        self.attempts.fetch_add(1, Ordering::SeqCst);
        // A panicking loader must still leave `Loading`, or waiters block forever.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load()))
            .unwrap_or_else(|payload| Err(Error::ModelLoad(panic_message(payload))));

        let mut state = self.lock();
        *state = match &outcome {
            Ok(model) => ModelState::Ready(Arc::clone(model)),
            Err(e) => {
                warn!("Model load failed: {}", e);
                ModelState::Failed(e.to_string())
            }
        };
        self.changed.notify_all();
        outcome
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload.downcast_ref::<&str>().map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".into());
    format!("model loader panicked: {}", detail)
}
