// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Polling waits against the cluster.
//!
//! Each wait polls its object at a fixed interval until a terminal signal or its own deadline.
//! Read errors, including the object not existing yet, are retried until the deadline.

mod job;
mod stage;

pub use job::JobWaiter;
pub use stage::StagePoller;
