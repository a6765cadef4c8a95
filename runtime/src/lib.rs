// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scanrelay runtime library: collects screener exports from a charting
//! site through a headless browser, consolidates them into one JSON
//! document, and relays that document to an integration endpoint.

pub mod cli;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod jitter;
pub mod pipeline;
pub mod publish;
pub mod renderer;
pub mod rest;
pub mod site;
