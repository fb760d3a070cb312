mod cli;
mod error;
mod server;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ConfigCommand};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose, cli.global.log_json);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let explicit = cli.global.config.as_deref();

    match cli.command {
        Some(Command::Config(ConfigCommand::Path)) => {
            let path = explicit.map_or_else(phxnet_config::config_path, Path::to_path_buf);
            println!("{}", path.display());
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = phxnet_config::load_config(explicit)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Some(Command::Serve) | None => {
            let config = phxnet_config::load_config(explicit)?;
            tracing::debug!(agents = config.agents.len(), "configuration loaded");
            server::serve(&config).await
        }
    }
}
