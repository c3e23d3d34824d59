// Copyright 2026 PlaceRank Contributors
// SPDX-License-Identifier: Apache-2.0

//! PlaceRank runtime: session pool, rank checker, and sweep scheduler for
//! local-search rank sweeps, plus the CLI and REST front ends.
//!
//! This library crate exposes the runtime modules for integration testing.

pub mod checker;
pub mod cli;
pub mod config;
pub mod pool;
pub mod progress;
pub mod renderer;
pub mod rest;
pub mod sweep;
