//! Run the pipeline once from the command line.

use crate::cli::build_launcher;
use crate::config::Config;
use crate::pipeline::Pipeline;
use anyhow::{bail, Result};

/// Execute one run and print its result as JSON on stdout.
pub async fn run(config: Config, no_publish: bool) -> Result<()> {
    let launcher = build_launcher(&config);
    let mut pipeline = Pipeline::new(config, launcher)?;
    if no_publish {
        pipeline = pipeline.without_publisher();
    }

    let result = pipeline.run().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.is_success() {
        bail!("{}", result.message);
    }
    Ok(())
}
