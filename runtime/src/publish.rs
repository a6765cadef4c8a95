// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Upstream publisher: POSTs the consolidated document to the integration
//! endpoint with HTTP basic auth.
//!
//! One attempt, no retry. Only `200 OK` counts as delivered; anything else
//! is reported and logged but never raised, because data that was collected
//! and not delivered is an acceptable outcome for a run.

use crate::config::UpstreamConfig;
use crate::consolidate::ConsolidatedDocument;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Request timeout for the upstream POST.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How a publish attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    Delivered,
    /// The endpoint answered with something other than 200.
    Rejected { status: u16, body: String },
    /// The request never got a response.
    Failed { reason: String },
    /// No upstream is configured.
    Skipped,
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Short description for run messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Delivered => "data pushed upstream".to_string(),
            Self::Rejected { status, body } => {
                format!("upstream rejected the data (status {status}): {body}")
            }
            Self::Failed { reason } => format!("upstream push failed: {reason}"),
            Self::Skipped => "no upstream configured; data not pushed".to_string(),
        }
    }
}

/// Sends documents to one configured endpoint.
#[derive(Clone)]
pub struct UpstreamPublisher {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamPublisher {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self { client, config })
    }

    /// Transmit `doc`. Never returns an error; see [`PublishOutcome`].
    pub async fn publish(&self, doc: &ConsolidatedDocument) -> PublishOutcome {
        info!(endpoint = %self.config.url, scans = doc.len(), "sending POST request upstream");

        let response = self
            .client
            .post(&self.config.url)
            .basic_auth(&self.config.username, Some(self.config.password.expose()))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(doc)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!("failed to push data: {e}");
                return PublishOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status();
        if status == StatusCode::OK {
            info!("data pushed upstream successfully");
            return PublishOutcome::Delivered;
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), response = %body, "failed to push data");
        PublishOutcome::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}
