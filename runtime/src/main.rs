// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scanrelay_runtime::cli;
use scanrelay_runtime::config::Config;
use std::net::{IpAddr, SocketAddr};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "scanrelay",
    about = "Run screener scans, merge their exports and relay them upstream",
    version
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the health check and pipeline trigger over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,
    },
    /// Run the pipeline once and print the result
    Run {
        /// Collect and merge exports without pushing them upstream
        #[arg(long)]
        no_publish: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
}

fn init_tracing(json: bool, verbose: bool) {
    let default = if verbose {
        "scanrelay=debug,scanrelay_runtime=debug"
    } else {
        "scanrelay=info,scanrelay_runtime=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.verbose);

    match cli.command {
        Commands::Serve { host, port } => {
            let config = Config::from_env().context("failed to load configuration")?;
            cli::serve::run(config, SocketAddr::new(host, port)).await
        }
        Commands::Run { no_publish } => {
            let config = Config::from_env().context("failed to load configuration")?;
            cli::run_cmd::run(config, no_publish).await
        }
        Commands::Doctor => cli::doctor::run().await,
    }
}
