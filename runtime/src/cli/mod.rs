//! CLI subcommand implementations for the scanrelay binary.

pub mod doctor;
pub mod run_cmd;
pub mod serve;

use crate::config::Config;
use crate::renderer::chromium::ChromiumLauncher;
use crate::renderer::{Launcher, NoopLauncher};
use std::sync::Arc;
use tracing::{info, warn};

/// Chromium if it can be found, otherwise a launcher that fails every run.
pub fn build_launcher(config: &Config) -> Arc<dyn Launcher> {
    match ChromiumLauncher::new(config.browser.clone()) {
        Ok(launcher) => {
            info!("using Chromium at {}", launcher.chrome_path().display());
            Arc::new(launcher)
        }
        Err(e) => {
            warn!("{e:#}");
            warn!("pipeline runs will fail until a browser is available");
            Arc::new(NoopLauncher::new(format!("{e:#}")))
        }
    }
}
