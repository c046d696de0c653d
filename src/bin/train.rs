//! Trains the digit CNN on prepared arrays and writes `<model_output>/model.json`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tokio::signal;

use digit_mlops::train::{run_training, ExperimentTracker, JsonlTracker, NoopTracker, TrainConfig};

#[derive(Parser, Debug)]
#[command(name = "digit-train")]
#[command(about = "Train the MNIST digit classifier")]
struct Args {
    /// Directory holding the prepared .npy arrays
    #[arg(long = "input_data")]
    input_data: PathBuf,

    /// Directory that receives model.json
    #[arg(long = "model_output")]
    model_output: PathBuf,

    #[arg(long, default_value_t = 15)]
    epochs: usize,

    #[arg(long = "batch_size", default_value_t = 128)]
    batch_size: usize,

    #[arg(long = "learning_rate", default_value_t = 0.001)]
    learning_rate: f32,

    /// Seeds weight initialization, shuffling and dropout
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Record params and metrics as JSON lines in this directory
    #[arg(long = "tracking_dir")]
    tracking_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.epochs == 0 || args.batch_size == 0 {
        anyhow::bail!("--epochs and --batch_size must be at least 1");
    }
    if !(args.learning_rate > 0.0) {
        anyhow::bail!("--learning_rate must be positive, got {}", args.learning_rate);
    }

    let mut config = TrainConfig::new(args.epochs, args.batch_size, args.learning_rate);
    config.seed = args.seed;
    let stop = Arc::new(AtomicBool::new(false));
    stop_on_ctrl_c(Arc::clone(&stop))?;
    config.stop_flag = Some(stop);

    let mut tracker: Box<dyn ExperimentTracker> = match args.tracking_dir {
        Some(dir) => Box::new(JsonlTracker::new(dir)),
        None => Box::new(NoopTracker),
    };

    log::info!("MNIST Digit Classifier Training");
    let report = run_training(&args.input_data, &args.model_output, &config, tracker.as_mut())
        .inspect_err(|e| log::error!("Training failed: {}", e))?;
    log::info!(
        "Training complete: test accuracy {:.4} after {} epochs, model at {}",
        report.test_accuracy,
        report.history.len(),
        report.model_path.display()
    );
    Ok(())
}

/// First Ctrl-C: finish the current epoch, then evaluate and save as usual.
/// Second Ctrl-C: exit immediately.
fn stop_on_ctrl_c(flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    thread::Builder::new().name("ctrl-c".into()).spawn(move || {
        runtime.block_on(async {
            if signal::ctrl_c().await.is_err() {
                return;
            }
            log::warn!("Interrupted, stopping after the current epoch (Ctrl-C again to abort)");
            flag.store(true, Ordering::Relaxed);
            if signal::ctrl_c().await.is_ok() {
                log::warn!("Aborting training");
                std::process::exit(130);
            }
        });
    })?;
    Ok(())
}
