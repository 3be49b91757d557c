use anyhow::Context;
use std::process::ExitCode;
use std::sync::Arc;

use vmfleet::cli::{parse_error_code, Cli};
use vmfleet::commands::Fleet;
use vmfleet::config::{FleetSettings, Registry};
use vmfleet::log_collector;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::parse_from_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            let code = parse_error_code(&e);
            let _ = e.print();
            return ExitCode::from(code as u8);
        }
    };

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let cwd = std::env::current_dir().context("Failed to get current working directory")?;
    let settings = FleetSettings::discover(cli.config.as_deref(), &cwd)?;

    // Logging first: everything below goes to the run log
    let collector = log_collector::init(&settings.logs_dir()).map_err(anyhow::Error::msg)?;
    log::info!("[Main] vmfleet {}", vmfleet::VERSION);

    let invocation = cli.command.into_invocation();
    let registry = Registry::load(&settings.paths.registry, invocation.accelerate)
        .with_context(|| format!("Cannot load registry {}", settings.paths.registry.display()))?;

    let fleet = Fleet::new(Arc::new(settings), registry);
    let result = fleet.run(&invocation).await;

    if let Err(e) = collector.wait_for_empty().await {
        eprintln!("[Main] WARNING: Failed to flush the run log: {}", e);
    }

    match result {
        Ok(outcome) => Ok(outcome.success),
        Err(e) => {
            log::error!("[Main] {}", e);
            Err(anyhow::anyhow!(e.user_message()))
        }
    }
}
