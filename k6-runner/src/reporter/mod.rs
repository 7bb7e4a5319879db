// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting progress of a run.
//!
//! The orchestrator emits [`RunEvent`]s through a callback as a run progresses, and
//! [`RunReporter`] renders them as human-readable text.

mod displayer;
mod events;

pub use displayer::*;
pub use events::*;
