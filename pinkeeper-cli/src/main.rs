//! `pinkeeper` binary entry point
//!
//! Errors are carried as `anyhow::Error` up to here and mapped to an exit code
//! through [`CliError::exit_code`].

use clap::Parser;
use colored::Colorize;

use pinkeeper_cli::cli::{Cli, Commands};
use pinkeeper_cli::commands;
use pinkeeper_cli::error::CliError;
use pinkeeper_cli::logging;
use pinkeeper_cli::output::OutputWriter;
use pinkeeper_core::config::{GeneralConfig, PinkeeperConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // `config validate` has to run even when the file is broken
    let loaded = PinkeeperConfig::load_or_default(&cli.config).await;

    let mut general = match &loaded {
        Ok(config) => config.general.clone(),
        Err(_) => GeneralConfig::default(),
    };
    if let Some(level) = cli.log_level {
        general.log_level = level;
    }
    logging::init_tracing(&general).map_err(|e| CliError::Config(e.to_string()))?;
    pinkeeper_core::metrics::describe_all();
    tracing::debug!(config = %cli.config.display(), "pinkeeper starting");

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await?,
        Commands::Sync(args) => {
            let mut config = loaded.map_err(CliError::from)?;
            config.general = general;
            commands::sync::execute(args, config, &writer).await?
        }
        Commands::Audit(args) => {
            let mut config = loaded.map_err(CliError::from)?;
            config.general = general;
            commands::audit::execute(args, config, &writer).await?
        }
    }

    Ok(())
}
