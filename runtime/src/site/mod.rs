// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Steps that drive the charting site's web UI.

pub mod auth;
pub mod scan;

use anyhow::Result;

/// Build an expression evaluating to whether `selector` matches an element.
///
/// The selector is embedded as a JSON string literal, never spliced raw.
pub fn selector_present_script(selector: &str) -> Result<String> {
    let literal = serde_json::to_string(selector)?;
    Ok(format!("document.querySelector({literal}) !== null"))
}
