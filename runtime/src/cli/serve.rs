//! Start the HTTP trigger service.

use crate::cli::build_launcher;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::rest::{self, AppState};
use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;

/// Serve the health and trigger endpoints until Ctrl-C.
pub async fn run(config: Config, addr: SocketAddr) -> Result<()> {
    info!("starting scanrelay v{}", env!("CARGO_PKG_VERSION"));
    info!(work_dir = %config.work_dir.display(), "exports and merged output live here");

    let launcher = build_launcher(&config);
    let pipeline = Pipeline::new(config, launcher)?;
    rest::start(addr, AppState::new(pipeline)).await?;

    info!("scanrelay stopped");
    Ok(())
}
