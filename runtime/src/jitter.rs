// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Randomized pauses between UI interactions.
//!
//! The target site watches for automation; evenly spaced actions are the
//! easiest tell. Every interaction in the authenticator and the scan runner
//! is bracketed by a pause drawn uniformly from a configured range.

use crate::config::TimingConfig;
use rand::Rng;
use std::time::Duration;
use tracing::trace;

/// Uniform pause range, inclusive on both ends.
#[derive(Debug, Clone, Copy)]
pub struct Jitter {
    min_ms: u64,
    max_ms: u64,
}

impl Jitter {
    /// Create a jitter range. Bounds are swapped if given in reverse.
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self::new(timing.jitter_min_ms, timing.jitter_max_ms)
    }

    /// No pausing at all.
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Draw one pause duration.
    pub fn sample(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }

    /// Sleep for a freshly drawn duration.
    pub async fn pause(&self) {
        let delay = self.sample();
        if delay.is_zero() {
            return;
        }
        trace!(delay_ms = delay.as_millis() as u64, "pacing pause");
        tokio::time::sleep(delay).await;
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::from_timing(&TimingConfig::default())
    }
}
