// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session authentication against the charting site.
//!
//! Fills the login form and submits it with the keyboard. The site gives
//! no reliable success signal, so unless a post-login selector is
//! configured a bad login only surfaces when the scan page misbehaves.

use super::selector_present_script;
use crate::config::{Credentials, SiteConfig, TimingConfig};
use crate::error::ScanError;
use crate::jitter::Jitter;
use crate::renderer::RenderContext;
use anyhow::{Context, Result};
use tracing::{debug, info};

pub struct SessionAuthenticator {
    site: SiteConfig,
    navigation_timeout_ms: u64,
    jitter: Jitter,
}

impl SessionAuthenticator {
    pub fn new(site: SiteConfig, timing: &TimingConfig, jitter: Jitter) -> Self {
        Self {
            site,
            navigation_timeout_ms: timing.navigation_timeout_ms,
            jitter,
        }
    }

    /// Log `ctx` into the site. The session lives in the context's cookies.
    pub async fn login(&self, ctx: &mut dyn RenderContext, credentials: &Credentials) -> Result<()> {
        let timeout = self.navigation_timeout_ms;

        let page = ctx
            .navigate(&self.site.login_url, timeout)
            .await
            .context("failed to open login page")?;
        debug!(url = %page.final_url, load_ms = page.load_time_ms, "login page loaded");
        self.jitter.pause().await;

        ctx.fill(&self.site.user_field, &credentials.user_id, timeout)
            .await
            .context("failed to enter user id")?;
        self.jitter.pause().await;

        ctx.fill(&self.site.password_field, credentials.password.expose(), timeout)
            .await
            .context("failed to enter password")?;
        self.jitter.pause().await;

        ctx.press_key("Enter")
            .await
            .context("failed to submit login form")?;
        self.jitter.pause().await;

        match &self.site.post_login_selector {
            Some(selector) => self.verify(ctx, selector).await?,
            None => debug!("no post-login selector configured; assuming login succeeded"),
        }

        let landed = ctx.get_url().await.context("failed to read post-login URL")?;
        info!(user = %credentials.user_id, url = %landed, "logged in");
        Ok(())
    }

    async fn verify(&self, ctx: &dyn RenderContext, selector: &str) -> Result<()> {
        let present = ctx
            .execute_js(&selector_present_script(selector)?)
            .await
            .context("failed to inspect post-login page")?;

        if present.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(ScanError::AuthenticationFailed {
                selector: selector.to_string(),
            }
            .into())
        }
    }
}
