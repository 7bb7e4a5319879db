// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle stages reported by the k6 operator, and job completion counters.

use crate::errors::UnknownStageError;
use std::{cmp::Ordering, fmt, str::FromStr};

/// The stage of a `TestRun`, as reported by the operator in `status.stage`.
///
/// The non-error stages are totally ordered:
/// `Initialization < Initialized < Created < Started < Stopped < Finished`.
///
/// [`Stage::Error`] sits outside that ordering. Comparing it against any other stage returns
/// `None` from [`PartialOrd::partial_cmp`], so `Stage::Error >= expected` is false for every progression stage. Callers
/// must check for it explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum Stage {
    /// The operator has picked up the resource and is starting the initializer.
    Initialization,
    /// The initializer job finished.
    Initialized,
    /// The run jobs were created.
    Created,
    /// The run jobs were started.
    Started,
    /// The run jobs were stopped.
    Stopped,
    /// The run finished.
    Finished,
    /// The operator gave up on this resource. Terminal.
    Error,
}

impl Stage {
    /// All stages, in progression order, followed by [`Stage::Error`].
    pub const ALL: [Stage; 7] = [
        Stage::Initialization,
        Stage::Initialized,
        Stage::Created,
        Stage::Started,
        Stage::Stopped,
        Stage::Finished,
        Stage::Error,
    ];

    /// Returns the raw value the operator writes for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initialization => "initialization",
            Stage::Initialized => "initialized",
            Stage::Created => "created",
            Stage::Started => "started",
            Stage::Stopped => "stopped",
            Stage::Finished => "finished",
            Stage::Error => "error",
        }
    }

    /// Returns true if this is the terminal error stage.
    pub fn is_error(self) -> bool {
        matches!(self, Stage::Error)
    }

    fn rank(self) -> Option<u8> {
        match self {
            Stage::Initialization => Some(0),
            Stage::Initialized => Some(1),
            Stage::Created => Some(2),
            Stage::Started => Some(3),
            Stage::Stopped => Some(4),
            Stage::Finished => Some(5),
            Stage::Error => None,
        }
    }
}

impl PartialOrd for Stage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            // Error only compares equal to itself.
            (None, None) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl FromStr for Stage {
    type Err = UnknownStageError;

    /// Parses a raw stage value. Matching is case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStageError::new(s))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `succeeded` and `failed` counters of a batch job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobCounters {
    /// Number of pods that succeeded.
    pub succeeded: u32,
    /// Number of pods that failed.
    pub failed: u32,
}

impl JobCounters {
    /// Creates a new set of counters.
    pub fn new(succeeded: u32, failed: u32) -> Self {
        Self { succeeded, failed }
    }

    /// Returns the terminal outcome, if there is one.
    ///
    /// A job is complete when exactly one of its counters is 1 and the other is 0. Any other
    /// combination, including the anomalous `succeeded + failed > 1`, is treated as not yet
    /// complete.
    pub fn outcome(&self) -> Option<JobOutcome> {
        match (self.succeeded, self.failed) {
            (1, 0) => Some(JobOutcome::Succeeded),
            (0, 1) => Some(JobOutcome::Failed),
            _ => None,
        }
    }

    /// Returns true if the counters are in a state the operator should never produce.
    pub fn is_anomalous(&self) -> bool {
        self.succeeded.saturating_add(self.failed) > 1
    }
}

impl fmt::Display for JobCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "succeeded={}, failed={}", self.succeeded, self.failed)
    }
}

/// The terminal outcome of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job's pod completed successfully.
    Succeeded,
    /// The job's pod failed.
    Failed,
}
