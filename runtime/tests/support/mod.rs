//! Scripted stand-in for the browser engine.
//!
//! Records every interaction in order and serves canned CSV exports, so
//! the pipeline can be exercised without Chromium or the real site.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use scanrelay_runtime::config::{Config, Credentials, Secret, TimingConfig, UpstreamConfig};
use scanrelay_runtime::error::ScanError;
use scanrelay_runtime::renderer::{Launcher, NavigationResult, RenderContext, Renderer};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the fake site behaves during a run.
#[derive(Clone, Default)]
pub struct Behavior {
    /// CSV bodies handed out by successive downloads.
    pub exports: Vec<String>,
    /// 1-based popup number that never opens.
    pub fail_popup_at: Option<usize>,
    /// The scan page has no ace editor (e.g. login silently failed).
    pub editor_missing: bool,
    /// Answer for post-login selector checks.
    pub post_login_present: bool,
    /// Hold each launch this long before returning.
    pub launch_delay: Duration,
    /// Closing a tab or popup reports an error (after closing it).
    pub close_fails: bool,
}

#[derive(Default)]
struct Shared {
    events: Vec<String>,
    injected: Vec<String>,
    exports: VecDeque<String>,
    popups: usize,
    downloads: usize,
    open: usize,
    open_at_shutdown: Vec<usize>,
}

/// Launcher handing out fake browsers that share one event log.
#[derive(Clone)]
pub struct FakeLauncher {
    behavior: Behavior,
    shared: Arc<Mutex<Shared>>,
}

impl FakeLauncher {
    pub fn new(behavior: Behavior) -> Self {
        let shared = Shared {
            exports: behavior.exports.iter().cloned().collect(),
            ..Shared::default()
        };
        Self {
            behavior,
            shared: Arc::new(Mutex::new(shared)),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.shared.lock().unwrap().events.clone()
    }

    /// Scripts passed to `execute_js` that load the editor.
    pub fn injected(&self) -> Vec<String> {
        self.shared.lock().unwrap().injected.clone()
    }

    /// Contexts still open each time a browser was shut down.
    pub fn open_at_shutdown(&self) -> Vec<usize> {
        self.shared.lock().unwrap().open_at_shutdown.clone()
    }

    fn record(shared: &Arc<Mutex<Shared>>, event: impl Into<String>) {
        shared.lock().unwrap().events.push(event.into());
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        if !self.behavior.launch_delay.is_zero() {
            tokio::time::sleep(self.behavior.launch_delay).await;
        }
        Self::record(&self.shared, "launch");
        Ok(Box::new(FakeRenderer {
            behavior: self.behavior.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeRenderer {
    behavior: Behavior,
    shared: Arc<Mutex<Shared>>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        {
            let mut shared = self.shared.lock().unwrap();
            shared.events.push("new_context".to_string());
            shared.open += 1;
        }
        Ok(Box::new(FakeContext {
            behavior: self.behavior.clone(),
            shared: Arc::clone(&self.shared),
            url: "about:blank".to_string(),
            popup: false,
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        {
            let mut shared = self.shared.lock().unwrap();
            shared.events.push("shutdown".to_string());
            let open = shared.open;
            shared.open_at_shutdown.push(open);
        }
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.shared.lock().unwrap().open
    }
}

struct FakeContext {
    behavior: Behavior,
    shared: Arc<Mutex<Shared>>,
    url: String,
    popup: bool,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        FakeLauncher::record(&self.shared, format!("navigate {url}"));
        self.url = url.to_string();
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        if script.contains("setValue(") {
            let mut shared = self.shared.lock().unwrap();
            shared.events.push("inject".to_string());
            shared.injected.push(script.to_string());
            return Ok(serde_json::Value::Bool(!self.behavior.editor_missing));
        }
        if script.contains("querySelector(") {
            FakeLauncher::record(&self.shared, "verify");
            return Ok(serde_json::Value::Bool(self.behavior.post_login_present));
        }
        Ok(serde_json::Value::Null)
    }

    async fn fill(&self, selector: &str, _value: &str, _timeout_ms: u64) -> Result<()> {
        FakeLauncher::record(&self.shared, format!("fill {selector}"));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        FakeLauncher::record(&self.shared, format!("press {key}"));
        Ok(())
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn click_for_popup(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<Box<dyn RenderContext>> {
        let n = {
            let mut shared = self.shared.lock().unwrap();
            shared.popups += 1;
            shared.events.push(format!("popup {selector}"));
            shared.popups
        };
        if self.behavior.fail_popup_at == Some(n) {
            return Err(ScanError::PopupTimeout {
                selector: selector.to_string(),
                timeout_ms,
            }
            .into());
        }
        self.shared.lock().unwrap().open += 1;
        Ok(Box::new(FakeContext {
            behavior: self.behavior.clone(),
            shared: Arc::clone(&self.shared),
            url: "https://results.test/popup".to_string(),
            popup: true,
        }))
    }

    async fn click_for_download(
        &self,
        selector: &str,
        download_dir: &Path,
        timeout_ms: u64,
    ) -> Result<PathBuf> {
        let (body, n) = {
            let mut shared = self.shared.lock().unwrap();
            shared.downloads += 1;
            shared.events.push(format!("download {selector}"));
            (shared.exports.pop_front(), shared.downloads)
        };
        let body = body.ok_or(ScanError::DownloadTimeout { timeout_ms })?;

        std::fs::create_dir_all(download_dir)?;
        let path = download_dir.join(format!("guid-{n}"));
        std::fs::write(&path, body)?;
        Ok(path)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let what = if self.popup { "close popup" } else { "close tab" };
        {
            let mut shared = self.shared.lock().unwrap();
            shared.events.push(what.to_string());
            shared.open -= 1;
        }
        if self.behavior.close_fails {
            anyhow::bail!("target already detached");
        }
        Ok(())
    }
}

/// Configuration with pacing disabled and the work dir at `dir`.
pub fn test_config(dir: &Path, upstream_url: Option<String>) -> Config {
    let mut config = Config::new(Credentials {
        user_id: "trader".into(),
        password: Secret::new("hunter2"),
    });
    config.work_dir = dir.to_path_buf();
    config.timing = TimingConfig {
        jitter_min_ms: 0,
        jitter_max_ms: 0,
        navigation_timeout_ms: 1_000,
        popup_timeout_ms: 1_000,
        download_timeout_ms: 1_000,
        settle_ms: 0,
    };
    config.upstream = upstream_url.map(|url| UpstreamConfig {
        url,
        username: "svc".into(),
        password: Secret::new("svc-pw"),
    });
    config
}

/// Exports for the daily, weekly and monthly scans, in that order.
pub fn three_exports() -> Vec<String> {
    vec![
        "Symbol,Rank\nAAPL,1\nMSFT,\n".to_string(),
        "Symbol,Rank\nGOOG,3\n".to_string(),
        "Symbol,Rank\nNVDA,2\nAMD,5\nINTC,\n".to_string(),
    ]
}
