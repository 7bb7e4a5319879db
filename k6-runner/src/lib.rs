// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [kubectl-k6](https://crates.io/crates/kubectl-k6).
//!
//! A run is driven through a fixed sequence: create the script config map and the `TestRun`
//! custom resource, wait for the k6 operator to report the initialization stage, wait for the
//! initializer job, wait for the run jobs to be created, then supervise every run job until it
//! finishes. Failures anywhere in that sequence are enriched with operator and pod logs, and the
//! run's resources are always deleted at the end.
//!
//! The cluster itself is reached through the [`ResourceStore`](store::ResourceStore) trait; the
//! [`KubeStore`](store::KubeStore) implementation talks to a real cluster through kube-rs.

pub mod cleanup;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod manifest;
pub mod naming;
pub mod orchestrator;
pub mod reporter;
pub mod run_jobs;
pub mod stage;
pub mod store;
#[cfg(test)]
mod test_helpers;
mod time;
pub mod wait;
