use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use slm_bench::cli::Args;
use slm_bench::{BenchConfig, BenchError, BenchmarkSession, OllamaClient};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Exit status after a user interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<BenchError>(), Some(BenchError::Cancelled(_))) => {
            eprintln!("\n🛑 {e}");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.apply_to(BenchConfig::load(args.config.as_deref())?);
    let models = config.models_to_test(&args.model);
    info!(host = %config.host, models = %models.join(", "), "SLM benchmark starting");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping");
            on_interrupt.cancel();
        }
    });

    let client = OllamaClient::new(
        config.host.clone(),
        config.connect_timeout(),
        config.request_timeout(),
    )
    .context("Failed to create inference client")?;

    let dataset = bench_core::load_dataset(&args.data_path).map_err(BenchError::from)?;

    let session = BenchmarkSession::new(
        Arc::new(client),
        config,
        args.run_config(),
        models,
        cancel,
    );
    session.run(&dataset).await?;
    Ok(())
}
