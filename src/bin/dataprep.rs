//! Converts `<input_data>/mnist_full.csv` into normalized, stratified
//! train/test `.npy` arrays.

use std::path::PathBuf;

use clap::Parser;

use digit_mlops::data::run_preparation;

#[derive(Parser, Debug)]
#[command(name = "digit-dataprep")]
#[command(about = "Prepare the MNIST digit dataset from CSV")]
struct Args {
    /// Directory containing mnist_full.csv
    #[arg(long = "input_data")]
    input_data: PathBuf,

    /// Directory that receives x_train.npy, y_train.npy, x_test.npy, y_test.npy
    #[arg(long = "output_data")]
    output_data: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("Starting MNIST data preparation");
    let report = run_preparation(&args.input_data, &args.output_data)
        .inspect_err(|e| log::error!("Data preparation failed: {}", e))?;
    log::info!(
        "Data preparation complete: {} train / {} test samples",
        report.train_samples, report.test_samples
    );
    Ok(())
}
