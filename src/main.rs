//! `telemetry_consumer` binary.
//!
//! Reads settings from flags, environment variables and an optional `.env`
//! file, installs the logger and signal handlers, then hands over to
//! [`run_consumer`]. The process exits non-zero when the run fails or when
//! buffered records could not be written at shutdown.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use telemetry_consumer::initialization::init_logger_with;
use telemetry_consumer::{run_consumer, spawn_signal_listener, Config, ConsumerReport};

#[tokio::main]
async fn main() -> ExitCode {
    load_env_file();
    let config = Config::parse();

    match consume(config).await {
        Ok(report) if report.unflushed == 0 => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Ok(report) => {
            print_report(&report);
            eprintln!(
                "telemetry_consumer: {} buffered record(s) were lost at shutdown",
                report.unflushed
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("telemetry_consumer error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn consume(config: Config) -> Result<ConsumerReport> {
    init_logger_with(config.log_level.clone().into(), config.log_format.clone())
        .context("Failed to initialize logger")?;

    let cancel = CancellationToken::new();
    let signals = spawn_signal_listener(cancel.clone());
    let result = run_consumer(config, cancel.clone()).await;

    cancel.cancel();
    let _ = signals.await;
    result
}

/// `.env` in the working directory wins; next to the executable is the fallback.
fn load_env_file() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    let beside_exe: Option<PathBuf> = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")));
    if let Some(path) = beside_exe.filter(|p| p.exists()) {
        let _ = dotenvy::from_path(&path);
    }
}

fn print_report(report: &ConsumerReport) {
    println!(
        "✅ {} row(s) committed from {} message(s) in {:.1}s",
        report.rows_committed, report.messages_received, report.elapsed_seconds
    );
    println!(
        "   dropped: {} undecodable, {} invalid; {} requeued, {} commit failure(s); next id {}",
        report.decode_dropped,
        report.validation_dropped,
        report.messages_requeued,
        report.commit_failures,
        report.next_id
    );
}
