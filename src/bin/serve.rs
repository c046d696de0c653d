//! HTTP inference service for the trained digit classifier.
//!
//! Run with:
//!   digit-serve --model_path ./model/model.json
//! Then open http://127.0.0.1:8000

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use tiny_http::Server;

use digit_mlops::server;
use digit_mlops::service::{DigitService, InkPolarity, ServiceConfig};

#[derive(Parser, Debug)]
#[command(name = "digit-serve")]
#[command(about = "Serve handwritten digit predictions over HTTP")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Model file written by digit-train
    #[arg(long = "model_path", env = "MODEL_PATH", default_value = "./model/model.json")]
    model_path: PathBuf,

    /// Upper bound on one model invocation, in milliseconds
    #[arg(long = "inference_timeout_ms", default_value_t = 10_000)]
    inference_timeout_ms: u64,

    /// Largest accepted request body, in bytes
    #[arg(long = "max_body_bytes", default_value_t = 10 * 1024 * 1024)]
    max_body_bytes: usize,

    /// Images show light ink on a dark background; skip inversion
    #[arg(long = "light_ink")]
    light_ink: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ServiceConfig {
        model_path: args.model_path,
        inference_timeout: Duration::from_millis(args.inference_timeout_ms),
        max_body_bytes: args.max_body_bytes,
        ink: if args.light_ink { InkPolarity::LightOnDark } else { InkPolarity::DarkOnLight },
    };

    let addr = format!("{}:{}", args.host, args.port);
    let http = Server::http(&addr).map_err(|e| anyhow!("failed to bind {}: {}", addr, e))?;

    let service = Arc::new(DigitService::new(config));
    log::info!("Starting up, loading model");
    service.warm_up();

    server::run(Arc::new(http), service);
    Ok(())
}
