//! `skirmish-server` binary.
//!
//! ```bash
//! skirmish-server --config skirmish.toml
//! skirmish-server --config skirmish.toml --bind 127.0.0.1:9000
//! skirmish-server --config skirmish.toml check-config
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use skirmish::{ServerConfig, SkirmishServer, console};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "skirmish-server", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "skirmish.toml")]
    config: PathBuf,

    /// Override `network.bind_addr`
    #[arg(long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configuration file, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ServerConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(Commands::CheckConfig) = cli.command {
        println!("{}: ok", cli.config.display());
        return ExitCode::SUCCESS;
    }

    init_logging(&config.log_level);

    let mut builder = SkirmishServer::builder();
    builder = match builder.config_file(&cli.config) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    if let Some(bind) = cli.bind {
        builder = builder.bind(bind);
    }

    let server = match builder.build().await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };

    let handle = server.handle();
    tokio::spawn(console::run_console(
        handle.clone(),
        BufReader::new(tokio::io::stdin()),
    ));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped with error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}
