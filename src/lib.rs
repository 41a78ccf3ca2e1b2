// Copyright 2026 Reelscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reelscan library — crawl casino sites for a provider's game catalog.
//!
//! This library crate exposes the core modules for integration testing.

#![allow(clippy::new_without_default)]

pub mod acquisition;
pub mod alias;
pub mod catalog;
pub mod classify;
pub mod cli;
pub mod config;
pub mod detection;
pub mod orchestrator;
pub mod progress;
pub mod renderer;
pub mod report;
