// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed failures raised by the browser-driven steps and by configuration.
//!
//! Everything else travels as `anyhow::Error` with context attached; these
//! variants exist where a caller or a test needs to tell failures apart.

/// Failures while driving the target site.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("element '{selector}' did not appear within {timeout_ms}ms")]
    ElementNotFound { selector: String, timeout_ms: u64 },

    #[error("no popup window opened within {timeout_ms}ms after clicking '{selector}'")]
    PopupTimeout { selector: String, timeout_ms: u64 },

    #[error("download did not complete within {timeout_ms}ms")]
    DownloadTimeout { timeout_ms: u64 },

    #[error("download was canceled by the browser")]
    DownloadCanceled,

    /// The post-login check selector was configured and is absent.
    #[error("login did not reach the expected page (missing '{selector}')")]
    AuthenticationFailed { selector: String },

    #[error("browser not available: {0}")]
    BrowserUnavailable(String),
}

/// Invalid or incomplete process configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// Only some of the upstream variables were provided.
    #[error("upstream configuration is incomplete: set all of {0} or none")]
    PartialUpstream(String),
}
