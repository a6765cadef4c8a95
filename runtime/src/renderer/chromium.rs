// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.

use super::{Launcher, NavigationResult, RenderContext, Renderer};
use crate::config::BrowserSettings;
use crate::error::ScanError;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::element::Element;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How often selector and popup waits re-check the page.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Find the Chromium binary path.
pub fn find_chromium(settings: &BrowserSettings) -> Option<PathBuf> {
    // 1. Explicit configuration
    if let Some(path) = &settings.chromium_path {
        if path.exists() {
            return Some(path.clone());
        }
        warn!("configured Chromium path {} does not exist", path.display());
    }

    // 2. System PATH
    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 3. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches one headless Chromium per pipeline run.
pub struct ChromiumLauncher {
    chrome_path: PathBuf,
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    /// Resolve the Chromium binary up front so a missing browser is
    /// reported at startup rather than on the first run.
    pub fn new(settings: BrowserSettings) -> Result<Self> {
        let chrome_path = find_chromium(&settings)
            .context("Chromium not found. Install Chrome or set SCANRELAY_CHROMIUM_PATH.")?;
        Ok(Self {
            chrome_path,
            settings,
        })
    }

    pub fn chrome_path(&self) -> &Path {
        &self.chrome_path
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        let mut builder = BrowserConfig::builder().chrome_executable(&self.chrome_path);
        builder = if self.settings.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };

        let config = builder
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler event error: {e}");
                }
            }
        });

        debug!("Chromium launched from {}", self.chrome_path.display());

        Ok(Box::new(ChromiumRenderer {
            browser: Arc::new(browser),
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        }))
    }
}

/// A running Chromium instance.
pub struct ChromiumRenderer {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            browser: Arc::clone(&self.browser),
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        let Self {
            browser, handler, ..
        } = *self;

        match Arc::try_unwrap(browser) {
            Ok(mut browser) => {
                if let Err(e) = browser.close().await {
                    warn!("failed to close Chromium cleanly: {e}");
                }
                let _ = browser.wait().await;
            }
            // Remaining contexts keep the browser alive; it is killed on drop.
            Err(_) => warn!("Chromium still referenced at shutdown"),
        }

        handler.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page, either a tab or a popup window.
pub struct ChromiumContext {
    page: Page,
    browser: Arc<Browser>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    async fn page_targets(&self) -> Result<HashSet<TargetId>> {
        let pages = self.browser.pages().await.context("failed to list pages")?;
        Ok(pages.iter().map(|p| p.target_id().clone()).collect())
    }
}

/// Poll for `selector` until it exists or the deadline passes.
async fn wait_for_element(page: &Page, selector: &str, timeout_ms: u64) -> Result<Element> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        match page.find_element(selector).await {
            Ok(element) => return Ok(element),
            Err(_) if Instant::now() < deadline => tokio::time::sleep(POLL_INTERVAL).await,
            Err(_) => {
                return Err(ScanError::ElementNotFound {
                    selector: selector.to_string(),
                    timeout_ms,
                }
                .into())
            }
        }
    }
}

/// Follow one download from its start event to completion.
async fn wait_for_download(
    begins: &mut EventStream<EventDownloadWillBegin>,
    progress: &mut EventStream<EventDownloadProgress>,
    download_dir: &Path,
) -> Result<PathBuf> {
    let begin = begins
        .next()
        .await
        .ok_or_else(|| anyhow!("download event stream closed"))?;
    let guid = begin.guid.clone();
    debug!(
        suggested = %begin.suggested_filename,
        guid = %guid,
        "download started"
    );

    while let Some(event) = progress.next().await {
        if event.guid != guid {
            continue;
        }
        match event.state {
            DownloadProgressState::Completed => return Ok(download_dir.join(&guid)),
            DownloadProgressState::Canceled => return Err(ScanError::DownloadCanceled.into()),
            DownloadProgressState::InProgress => {}
        }
    }
    bail!("download event stream closed before completion")
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn fill(&self, selector: &str, value: &str, timeout_ms: u64) -> Result<()> {
        let element = wait_for_element(&self.page, selector, timeout_ms).await?;
        element
            .click()
            .await
            .with_context(|| format!("failed to focus '{selector}'"))?;
        element
            .type_str(value)
            .await
            .with_context(|| format!("failed to type into '{selector}'"))?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let focused = self
            .page
            .find_element(":focus")
            .await
            .context("no focused element to receive key press")?;
        focused
            .press_key(key)
            .await
            .with_context(|| format!("failed to press {key}"))?;
        Ok(())
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .unwrap_or_default();
        Ok(url)
    }

    async fn click_for_popup(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<Box<dyn RenderContext>> {
        let before = self.page_targets().await?;
        let element = wait_for_element(&self.page, selector, timeout_ms).await?;
        element
            .click()
            .await
            .with_context(|| format!("failed to click '{selector}'"))?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let pages = self.browser.pages().await.context("failed to list pages")?;
            if let Some(popup) = pages
                .into_iter()
                .find(|p| !before.contains(p.target_id()))
            {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let _ = tokio::time::timeout(remaining, popup.wait_for_navigation()).await;
                self.active_count.fetch_add(1, Ordering::Relaxed);
                return Ok(Box::new(ChromiumContext {
                    page: popup,
                    browser: Arc::clone(&self.browser),
                    active_count: Arc::clone(&self.active_count),
                }));
            }
            if Instant::now() >= deadline {
                return Err(ScanError::PopupTimeout {
                    selector: selector.to_string(),
                    timeout_ms,
                }
                .into());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click_for_download(
        &self,
        selector: &str,
        download_dir: &Path,
        timeout_ms: u64,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(download_dir)
            .await
            .with_context(|| format!("failed to create {}", download_dir.display()))?;
        let download_dir = tokio::fs::canonicalize(download_dir).await?;

        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(download_dir.to_string_lossy().into_owned())
            .events_enabled(true)
            .build()
            .map_err(|e| anyhow!("invalid download behavior: {e}"))?;
        self.browser
            .execute(behavior)
            .await
            .context("failed to enable downloads")?;

        // Subscribe before clicking so no event is missed.
        let mut begins = self
            .browser
            .event_listener::<EventDownloadWillBegin>()
            .await?;
        let mut progress = self
            .browser
            .event_listener::<EventDownloadProgress>()
            .await?;

        let element = wait_for_element(&self.page, selector, timeout_ms).await?;
        element
            .click()
            .await
            .with_context(|| format!("failed to click '{selector}'"))?;

        let wait = wait_for_download(&mut begins, &mut progress, &download_dir);

        match tokio::time::timeout(Duration::from_millis(timeout_ms), wait).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::DownloadTimeout { timeout_ms }.into()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}
