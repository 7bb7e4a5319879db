// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for kubectl-k6.
//!
//! Configuration is layered, from lowest to highest priority:
//!
//! 1. The defaults in [`OrchestratorConfig::DEFAULT_CONFIG`].
//! 2. A config file: the one passed in, or `kubectl-k6.toml` in the current directory if it
//!    exists.
//! 3. Environment variables prefixed with `K6K8S_`, with `__` separating path components.
//!
//! Command-line arguments are applied on top by the binary.

mod elements;
mod imp;

pub use elements::*;
pub use imp::*;
