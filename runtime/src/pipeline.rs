// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pipeline orchestration.
//!
//! One run moves through a fixed sequence of stages:
//!
//! ```text
//! Idle → Authenticated → ScanDone(1..n) → Consolidated → Published | PublishFailed → Complete
//! ```
//!
//! Authentication, scan and consolidation errors end the run in `Failed`
//! and are returned as an error [`RunResult`]. Publishing problems never
//! fail a run. Only one run may be in flight at a time; the scans share a
//! single browser session and the work directory's export file names.

use crate::config::Config;
use crate::consolidate::{consolidate, ConsolidatedDocument};
use crate::jitter::Jitter;
use crate::publish::{PublishOutcome, UpstreamPublisher};
use crate::renderer::{Launcher, RenderContext, Renderer};
use crate::site::auth::SessionAuthenticator;
use crate::site::scan::{ScanDefinition, ScanRunner};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Authenticated,
    /// The given number of scans have finished.
    ScanDone(usize),
    Consolidated,
    Published,
    PublishFailed,
    Complete,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => f.write_str("idle"),
            Stage::Authenticated => f.write_str("authenticated"),
            Stage::ScanDone(n) => write!(f, "scan {n} done"),
            Stage::Consolidated => f.write_str("consolidated"),
            Stage::Published => f.write_str("published"),
            Stage::PublishFailed => f.write_str("publish failed"),
            Stage::Complete => f.write_str("complete"),
            Stage::Failed => f.write_str("failed"),
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    info!(from = %stage, to = %next, "pipeline stage");
    *stage = next;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// Structured outcome handed back to whoever triggered the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ConsolidatedDocument>,
}

impl RunResult {
    pub fn success(message: impl Into<String>, data: ConsolidatedDocument) -> Self {
        Self {
            status: RunStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Another run holds the single-run gate.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("a pipeline run is already in progress")]
pub struct PipelineBusy;

/// Holds the run-in-progress flag; clears it on drop, even on panic.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, PipelineBusy> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| PipelineBusy)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sequences login, scans, consolidation and publishing.
pub struct Pipeline {
    config: Config,
    launcher: Arc<dyn Launcher>,
    publisher: Option<UpstreamPublisher>,
    scans: Vec<ScanDefinition>,
    jitter: Jitter,
    running: AtomicBool,
}

impl Pipeline {
    /// Build a pipeline running the periodic scans for the configured list.
    pub fn new(config: Config, launcher: Arc<dyn Launcher>) -> Result<Self> {
        let publisher = config
            .upstream
            .clone()
            .map(UpstreamPublisher::new)
            .transpose()?;
        let scans = ScanDefinition::periodic(config.site.favorites_list);
        let jitter = Jitter::from_timing(&config.timing);
        Ok(Self {
            config,
            launcher,
            publisher,
            scans,
            jitter,
            running: AtomicBool::new(false),
        })
    }

    /// Replace the scan set.
    pub fn with_scans(mut self, scans: Vec<ScanDefinition>) -> Self {
        self.scans = scans;
        self
    }

    /// Never publish, even if an upstream is configured.
    pub fn without_publisher(mut self) -> Self {
        self.publisher = None;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the whole pipeline once.
    ///
    /// Fails only if another run is in progress; every pipeline failure is
    /// folded into the returned [`RunResult`].
    pub async fn run(&self) -> Result<RunResult, PipelineBusy> {
        let _guard = RunGuard::acquire(&self.running).inspect_err(|_| {
            warn!("rejecting pipeline trigger: a run is already in progress");
        })?;

        let started = Instant::now();
        let mut stage = Stage::Idle;
        info!(scans = self.scans.len(), "pipeline run started");

        let result = match self.execute(&mut stage).await {
            Ok((doc, outcome)) => {
                let message = match outcome {
                    PublishOutcome::Delivered => "Pipeline completed.".to_string(),
                    other => format!("Pipeline completed; {}.", other.describe()),
                };
                advance(&mut stage, Stage::Complete);
                RunResult::success(message, doc)
            }
            Err(e) => {
                error!(stage = %stage, "pipeline failed: {e:#}");
                advance(&mut stage, Stage::Failed);
                RunResult::error(format!("{e:#}"))
            }
        };

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = ?result.status,
            "pipeline run finished"
        );
        Ok(result)
    }

    async fn execute(&self, stage: &mut Stage) -> Result<(ConsolidatedDocument, PublishOutcome)> {
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .with_context(|| {
                format!("failed to create work dir {}", self.config.work_dir.display())
            })?;

        self.collect(stage).await?;

        let work_dir = self.config.work_dir.clone();
        let output = self.config.output_path();
        let doc = tokio::task::spawn_blocking(move || consolidate(&work_dir, &output))
            .await
            .context("consolidation task panicked")?
            .context("consolidation failed")?;
        advance(stage, Stage::Consolidated);

        let outcome = match &self.publisher {
            Some(publisher) => publisher.publish(&doc).await,
            None => {
                warn!("no upstream configured; skipping publish");
                PublishOutcome::Skipped
            }
        };
        match outcome {
            PublishOutcome::Delivered => advance(stage, Stage::Published),
            PublishOutcome::Skipped => {}
            _ => advance(stage, Stage::PublishFailed),
        }

        Ok((doc, outcome))
    }

    /// Browser half of the run: launch, log in, run every scan, tear down.
    async fn collect(&self, stage: &mut Stage) -> Result<()> {
        let renderer = self
            .launcher
            .launch()
            .await
            .context("failed to start browser")?;

        let result = self.drive(renderer.as_ref(), stage).await;

        let open = renderer.active_contexts();
        if open > 0 {
            warn!(open, "browser contexts still open at shutdown");
        }
        if let Err(e) = renderer.shutdown().await {
            warn!("browser shutdown failed: {e:#}");
        }
        result
    }

    async fn drive(&self, renderer: &dyn Renderer, stage: &mut Stage) -> Result<()> {
        let mut ctx = renderer
            .new_context()
            .await
            .context("failed to open browser tab")?;

        let result = self.drive_context(ctx.as_mut(), stage).await;

        if let Err(e) = ctx.close().await {
            warn!("failed to close browser tab: {e:#}");
        }
        result
    }

    async fn drive_context(&self, ctx: &mut dyn RenderContext, stage: &mut Stage) -> Result<()> {
        let authenticator =
            SessionAuthenticator::new(self.config.site.clone(), &self.config.timing, self.jitter);
        authenticator
            .login(ctx, &self.config.credentials)
            .await
            .context("authentication failed")?;
        advance(stage, Stage::Authenticated);

        let runner = ScanRunner::new(
            self.config.site.clone(),
            self.config.timing.clone(),
            self.jitter,
            self.config.work_dir.clone(),
        );
        for (i, scan) in self.scans.iter().enumerate() {
            runner
                .run(ctx, scan)
                .await
                .with_context(|| format!("scan '{}' failed", scan.name))?;
            advance(stage, Stage::ScanDone(i + 1));
        }

        // Give the last download time to flush before the browser goes away.
        let settle = Duration::from_millis(self.config.timing.settle_ms);
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }
}
