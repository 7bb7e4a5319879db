// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long a run takes.
//!
//! A run needs both a wall-clock start time, which is sent to the cluster as the "since" cursor
//! for log queries, and a monotonic clock for reporting elapsed time. The monotonic side uses
//! tokio's clock so that it follows virtual time in tests.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Utc>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            start_time: Utc::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) duration: Duration,
}

impl StopwatchSnapshot {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.start_time + self.duration
    }
}
