// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scan runner: one screening query from editor to saved CSV export.
//!
//! A scan is driven entirely through the site's UI:
//! 1. open the scan page
//! 2. load the query into the ace editor
//! 3. run it and wait for the results popup
//! 4. export the results from the popup and wait for the download
//! 5. move the download to the scan's export file
//!
//! Every step is paced with [`Jitter`]. Any failure aborts the scan.

use crate::config::{SiteConfig, TimingConfig};
use crate::jitter::Jitter;
use crate::renderer::RenderContext;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Subdirectory of the work directory that receives raw browser downloads.
pub const DOWNLOAD_SUBDIR: &str = ".downloads";

/// Time granularity of the trend ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    /// Output key and file stem.
    pub fn name(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Period keyword in the scan language. Monthly is spelled "month".
    fn keyword(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "month",
        }
    }
}

/// Query text for one granularity over a favorites list.
pub fn scan_script(favorites_list: u32, granularity: Granularity) -> String {
    format!(
        "[favorites list is {favorites_list}]\nRank by {} chande trend meter",
        granularity.keyword()
    )
}

/// One screening query and where its export goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDefinition {
    /// Key of this scan's rows in the consolidated document.
    pub name: String,
    pub script: String,
    /// Export file name inside the work directory.
    pub filename: String,
}

impl ScanDefinition {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        let name = name.into();
        let filename = format!("{name}.csv");
        Self {
            name,
            script: script.into(),
            filename,
        }
    }

    /// The daily, weekly and monthly trend scans, in run order.
    pub fn periodic(favorites_list: u32) -> Vec<ScanDefinition> {
        Granularity::ALL
            .iter()
            .map(|&g| Self::new(g.name(), scan_script(favorites_list, g)))
            .collect()
    }
}

/// Build the expression that loads `text` into the ace editor `editor_id`.
///
/// Both values are serialized as JSON string literals, so quotes,
/// backticks, backslashes and newlines in the query cannot escape into
/// the page's script. Evaluates to `false` when ace is not loaded.
pub fn editor_injection_script(editor_id: &str, text: &str) -> Result<String> {
    let id = serde_json::to_string(editor_id)?;
    let value = serde_json::to_string(text)?;
    Ok(format!(
        "(() => {{\n\
         \x20   if (!window.ace) {{ return false; }}\n\
         \x20   const editor = window.ace.edit({id});\n\
         \x20   editor.setValue({value}, -1);\n\
         \x20   return true;\n\
         }})()"
    ))
}

/// Drives a single scan through an authenticated context.
pub struct ScanRunner {
    site: SiteConfig,
    timing: TimingConfig,
    jitter: Jitter,
    work_dir: PathBuf,
}

impl ScanRunner {
    pub fn new(site: SiteConfig, timing: TimingConfig, jitter: Jitter, work_dir: PathBuf) -> Self {
        Self {
            site,
            timing,
            jitter,
            work_dir,
        }
    }

    /// Run `scan` and return the path of its saved export.
    pub async fn run(&self, ctx: &mut dyn RenderContext, scan: &ScanDefinition) -> Result<PathBuf> {
        let page = ctx
            .navigate(&self.site.scan_url, self.timing.navigation_timeout_ms)
            .await
            .context("failed to open scan page")?;
        debug!(scan = %scan.name, load_ms = page.load_time_ms, "scan page loaded");
        self.jitter.pause().await;

        let inject = editor_injection_script(&self.site.editor_id, &scan.script)?;
        let loaded = ctx
            .execute_js(&inject)
            .await
            .context("failed to load query into the script editor")?;
        if loaded.as_bool() != Some(true) {
            bail!(
                "script editor '{}' is not available on the scan page (is the session logged in?)",
                self.site.editor_id
            );
        }
        self.jitter.pause().await;

        let popup = ctx
            .click_for_popup(&self.site.run_selector, self.timing.popup_timeout_ms)
            .await
            .context("scan did not open its results window")?;
        self.jitter.pause().await;

        let download_dir = self.work_dir.join(DOWNLOAD_SUBDIR);
        let downloaded = popup
            .click_for_download(
                &self.site.download_selector,
                &download_dir,
                self.timing.download_timeout_ms,
            )
            .await;
        if let Err(e) = popup.close().await {
            warn!("failed to close results window: {e:#}");
        }
        let downloaded = downloaded.context("export download failed")?;

        let dest = self.work_dir.join(&scan.filename);
        persist_download(&downloaded, &dest).await?;
        info!(scan = %scan.name, file = %dest.display(), "CSV downloaded");
        self.jitter.pause().await;

        Ok(dest)
    }
}

/// Move a finished download to `dest`, replacing any existing file.
async fn persist_download(src: &Path, dest: &Path) -> Result<()> {
    if tokio::fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }

    // Cross-device moves and platforms that refuse to replace fall back to copy.
    tokio::fs::copy(src, dest)
        .await
        .with_context(|| format!("failed to write export to {}", dest.display()))?;
    if let Err(e) = tokio::fs::remove_file(src).await {
        warn!("failed to remove raw download {}: {e}", src.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_definitions() {
        let scans = ScanDefinition::periodic(34);
        let names: Vec<&str> = scans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["daily", "weekly", "monthly"]);

        assert_eq!(scans[0].filename, "daily.csv");
        assert_eq!(
            scans[0].script,
            "[favorites list is 34]\nRank by daily chande trend meter"
        );
        assert_eq!(
            scans[2].script,
            "[favorites list is 34]\nRank by month chande trend meter"
        );
        assert_eq!(scans[2].filename, "monthly.csv");
    }

    #[test]
    fn test_injection_serializes_query_as_json_literal() {
        let hostile = "rank `x` by \"y\"\\ ${alert(1)}\nline two";
        let script = editor_injection_script("clauses-ace", hostile).unwrap();

        let literal = serde_json::to_string(hostile).unwrap();
        assert!(script.contains(&format!("editor.setValue({literal}, -1);")));
        assert!(script.contains(r#"window.ace.edit("clauses-ace")"#));

        // The query's own newline must not survive unescaped.
        assert!(!script.contains("\nline two"));
    }

    #[test]
    fn test_injection_literal_decodes_to_original_text() {
        let text = scan_script(7, Granularity::Weekly);
        let script = editor_injection_script("clauses-ace", &text).unwrap();

        let start = script.find("setValue(").unwrap() + "setValue(".len();
        let end = script.rfind(", -1)").unwrap();
        let decoded: String = serde_json::from_str(&script[start..end]).unwrap();
        assert_eq!(decoded, text);
    }

    #[tokio::test]
    async fn test_persist_download_overwrites_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("guid-1234");
        let dest = dir.path().join("daily.csv");
        tokio::fs::write(&src, "Symbol\nAAPL\n").await.unwrap();
        tokio::fs::write(&dest, "stale").await.unwrap();

        persist_download(&src, &dest).await.unwrap();

        assert_eq!(
            tokio::fs::read_to_string(&dest).await.unwrap(),
            "Symbol\nAAPL\n"
        );
        assert!(!src.exists());
    }
}
