//! frontdoor CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use frontdoor_client::cli::{Cli, Command, ConfigAction};
use frontdoor_client::commands;
use frontdoor_client::config::ClientConfig;
use frontdoor_client::error::ClientResult;
use frontdoor_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::for_verbosity(cli.debug)) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };

    match cli.command {
        Command::Send {
            method,
            ref resource,
            ref body,
            no_wait,
        } => {
            let connection = cli.connection_config(&config);
            commands::send::run(connection, method, resource, body.clone(), no_wait).await
        }
        Command::Listen { count, seconds } => {
            commands::listen::run(cli.connection_config(&config), count, seconds).await
        }
        Command::Mock { bind } => commands::mock::run(bind).await,
        Command::Config { ref action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
