use anyhow::{Context, Result};
use std::sync::Arc;

use lirc_indicator::{
    cli::{Cli, Invocation},
    config::IndicatorConfig,
    daemon::{daemonize, Fork},
    indicator,
    lifecycle::{install_interrupt_handler, Lifecycle, Termination},
};

fn main() -> Result<()> {
    let cli = match Cli::from_args(std::env::args_os()) {
        Invocation::Run(cli) => cli,
        Invocation::Exit { message, code } => {
            if code == 0 {
                print!("{}", message);
            } else {
                eprint!("{}", message);
            }
            std::process::exit(code);
        }
    };

    cli.setup_logging();

    let lifecycle = Arc::new(Lifecycle::new());

    let config = match cli.into_config(IndicatorConfig::from_env()) {
        Ok(config) => config,
        Err(err) => {
            let code = lifecycle.terminate(&Termination::Failed(err.into()));
            eprintln!("Try `lirc-indicator --help' for more information.");
            std::process::exit(code);
        }
    };

    match serde_json::to_string(&config) {
        Ok(json) => tracing::debug!("Configuration: {}", json),
        Err(err) => tracing::debug!("Configuration not serializable: {}", err),
    }

    if config.daemon {
        match daemonize().context("Failed to fork into the background")? {
            Fork::Parent(pid) => {
                tracing::info!("Running in background as pid {}", pid);
                return Ok(());
            }
            Fork::Child => {}
        }
    }

    install_interrupt_handler(Arc::clone(&lifecycle))
        .context("Failed to install SIGINT handler")?;

    let code = indicator::run(&config, &lifecycle);
    std::process::exit(code);
}
