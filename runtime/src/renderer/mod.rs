// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser engine abstraction.
//!
//! Defines the `Launcher`, `Renderer` and `RenderContext` traits that the
//! site steps drive. The production engine is Chromium via chromiumoxide;
//! tests supply a scripted implementation.

pub mod chromium;

use crate::error::ScanError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Starts a fresh browser for one pipeline run.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Renderer>>;
}

/// A running browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(self: Box<Self>) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab or popup window).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute a JavaScript expression in the page and return its value.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Wait for an input matching `selector`, focus it and type `value`.
    async fn fill(&self, selector: &str, value: &str, timeout_ms: u64) -> Result<()>;
    /// Press a named key (e.g. "Enter") on the focused element.
    async fn press_key(&self, key: &str) -> Result<()>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Click `selector` and block until the page opens a popup window.
    async fn click_for_popup(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<Box<dyn RenderContext>>;
    /// Click `selector` and block until the resulting download completes.
    ///
    /// Returns the path of the downloaded file inside `download_dir`.
    async fn click_for_download(
        &self,
        selector: &str,
        download_dir: &Path,
        timeout_ms: u64,
    ) -> Result<PathBuf>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Launcher used when Chromium is unavailable.
///
/// The service still starts and answers health checks; every run fails
/// with a structured error instead.
pub struct NoopLauncher {
    reason: String,
}

impl NoopLauncher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Launcher for NoopLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        Err(ScanError::BrowserUnavailable(self.reason.clone()).into())
    }
}
