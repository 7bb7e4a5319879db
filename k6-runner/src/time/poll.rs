// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{future::Future, time::Duration};
use tokio::time::{Instant, sleep_until, timeout_at};

/// Deadlines past this horizon are clamped to it.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Returns the instant `timeout` from now, clamped so that it cannot overflow.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(FAR_FUTURE)).unwrap_or(now)
}

/// A fixed-interval polling schedule bounded by an absolute deadline.
///
/// The first poll happens immediately. After that, [`Self::wait_next`] sleeps for one interval,
/// or until the deadline if that comes first.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PollSchedule {
    interval: Duration,
    deadline: Instant,
}

impl PollSchedule {
    pub(crate) fn new(interval: Duration, timeout: Duration) -> Self {
        Self::with_deadline(interval, deadline_after(timeout))
    }

    pub(crate) fn with_deadline(interval: Duration, deadline: Instant) -> Self {
        Self { interval, deadline }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Sleeps until the next poll. Returns false if the deadline has been reached.
    pub(crate) async fn wait_next(&self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        let next = now
            .checked_add(self.interval)
            .map_or(self.deadline, |next| next.min(self.deadline));
        sleep_until(next).await;
        next < self.deadline
    }

    /// Runs a store read, abandoning it at the deadline.
    pub(crate) async fn read<F: Future>(&self, fut: F) -> Option<F::Output> {
        timeout_at(self.deadline, fut).await.ok()
    }
}
