// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process configuration loaded once at startup.
//!
//! Secrets and deployment-specific values come from the environment (a
//! `.env` file is honoured). The resulting [`Config`] is passed explicitly
//! to the authenticator and the publisher; nothing reads the environment
//! after startup.

use crate::error::ConfigError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_SITE_USER: &str = "STOCKCHARTS_USER_ID";
pub const ENV_SITE_PASSWORD: &str = "STOCKCHARTS_PASSWORD";
pub const ENV_UPSTREAM_URL: &str = "BOOMI_API_URL";
pub const ENV_UPSTREAM_USER: &str = "BOOMI_USERNAME";
pub const ENV_UPSTREAM_PASSWORD: &str = "BOOMI_PASSWORD";

/// Default name of the consolidated output written into the work directory.
pub const DEFAULT_OUTPUT_FILE: &str = "merged_output.json";

/// Default favorites list the screening queries run against.
pub const DEFAULT_FAVORITES_LIST: u32 = 34;

/// A string that must never appear in logs or debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Login for the charting site.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub password: Secret,
}

/// Where the target site lives and how its UI is addressed.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub login_url: String,
    pub scan_url: String,
    pub user_field: String,
    pub password_field: String,
    /// Element id of the ace editor holding the scan clauses.
    pub editor_id: String,
    pub run_selector: String,
    /// Selector of the CSV export control inside the results popup.
    pub download_selector: String,
    /// When set, login is verified by the presence of this element.
    pub post_login_selector: Option<String>,
    pub favorites_list: u32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: "https://stockcharts.com/login/index.php".to_string(),
            scan_url: "https://stockcharts.com/def/servlet/ScanUI".to_string(),
            user_field: r#"input[name="form_UserID"]"#.to_string(),
            password_field: r#"input[name="form_UserPassword"]"#.to_string(),
            editor_id: "clauses-ace".to_string(),
            run_selector: "input#runScan".to_string(),
            download_selector: "button#download-csv".to_string(),
            post_login_selector: None,
            favorites_list: DEFAULT_FAVORITES_LIST,
        }
    }
}

/// Integration endpoint receiving the consolidated document.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    pub username: String,
    pub password: Secret,
}

/// Pacing and wait ceilings, all in milliseconds.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub navigation_timeout_ms: u64,
    pub popup_timeout_ms: u64,
    pub download_timeout_ms: u64,
    /// Pause after the last scan before the browser is torn down.
    pub settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            jitter_min_ms: 1_000,
            jitter_max_ms: 5_000,
            navigation_timeout_ms: 30_000,
            popup_timeout_ms: 30_000,
            download_timeout_ms: 30_000,
            settle_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chromium_path: None,
            headless: true,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub site: SiteConfig,
    /// `None` means publishing is skipped.
    pub upstream: Option<UpstreamConfig>,
    pub timing: TimingConfig,
    pub browser: BrowserSettings,
    /// Directory holding the per-run exports and the consolidated output.
    pub work_dir: PathBuf,
    pub output_file: String,
}

impl Config {
    /// Defaults for everything except the site login.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            site: SiteConfig::default(),
            upstream: None,
            timing: TimingConfig::default(),
            browser: BrowserSettings::default(),
            work_dir: PathBuf::from("."),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
        }
    }

    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credentials = Credentials {
            user_id: get(ENV_SITE_USER).ok_or(ConfigError::Missing(ENV_SITE_USER))?,
            password: Secret::new(
                get(ENV_SITE_PASSWORD).ok_or(ConfigError::Missing(ENV_SITE_PASSWORD))?,
            ),
        };

        let mut config = Self::new(credentials);

        let upstream_parts = (
            get(ENV_UPSTREAM_URL),
            get(ENV_UPSTREAM_USER),
            get(ENV_UPSTREAM_PASSWORD),
        );
        config.upstream = match upstream_parts {
            (Some(url), Some(username), Some(password)) => Some(UpstreamConfig {
                url,
                username,
                password: Secret::new(password),
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::PartialUpstream(format!(
                    "{ENV_UPSTREAM_URL}, {ENV_UPSTREAM_USER}, {ENV_UPSTREAM_PASSWORD}"
                )))
            }
        };

        if let Some(dir) = get("SCANRELAY_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        config.browser.chromium_path = get("SCANRELAY_CHROMIUM_PATH").map(PathBuf::from);
        config.browser.headless = parse_or(&get, "SCANRELAY_HEADLESS", true)?;

        config.site.favorites_list =
            parse_or(&get, "SCANRELAY_FAVORITES_LIST", DEFAULT_FAVORITES_LIST)?;
        config.site.post_login_selector = get("SCANRELAY_POST_LOGIN_SELECTOR");

        let timing = &mut config.timing;
        timing.jitter_min_ms = parse_or(&get, "SCANRELAY_JITTER_MIN_MS", timing.jitter_min_ms)?;
        timing.jitter_max_ms = parse_or(&get, "SCANRELAY_JITTER_MAX_MS", timing.jitter_max_ms)?;
        timing.popup_timeout_ms =
            parse_or(&get, "SCANRELAY_POPUP_TIMEOUT_MS", timing.popup_timeout_ms)?;
        timing.download_timeout_ms =
            parse_or(&get, "SCANRELAY_DOWNLOAD_TIMEOUT_MS", timing.download_timeout_ms)?;

        if timing.jitter_min_ms > timing.jitter_max_ms {
            return Err(ConfigError::Invalid {
                key: "SCANRELAY_JITTER_MIN_MS",
                reason: format!(
                    "minimum {} exceeds maximum {}",
                    timing.jitter_min_ms, timing.jitter_max_ms
                ),
            });
        }

        Ok(config)
    }

    /// Full path of the consolidated output file.
    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(&self.output_file)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
