use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sifter_cli::{cli::Cli, run};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for --json
    let env_filter = EnvFilter::builder()
        .with_default_directive(cli.level().into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current batch");
            on_signal.cancel();
        }
    });

    match run::execute(&cli, &cancel).await {
        Ok(report) => {
            if let Err(e) = run::print_report(&report, cli.json) {
                error!("{e:#}");
                return ExitCode::FAILURE;
            }
            info!(elapsed_ms = report.elapsed_ms, "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error ({}): {err}", err.category());
            if let Some(hint) = err.hint() {
                eprintln!("Hint: {hint}");
            }
            ExitCode::from(err.exit_code())
        }
    }
}
