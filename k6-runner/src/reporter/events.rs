// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    diagnostics::DiagnosticReport,
    errors::{CleanupError, StoreError},
    naming::RunNames,
    orchestrator::RunReport,
    stage::Stage,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// An event that occurred during a run.
#[derive(Clone, Debug)]
pub struct RunEvent<'a> {
    /// The time at which the event was generated.
    pub timestamp: DateTime<Utc>,

    /// The amount of time elapsed since the start of the run.
    pub elapsed: Duration,

    /// The kind of event this is.
    pub kind: RunEventKind<'a>,
}

/// The kind of run event this is.
///
/// Forms part of [`RunEvent`].
#[derive(Clone, Debug)]
pub enum RunEventKind<'a> {
    /// Leftover objects with the run's names are being deleted before the run starts.
    PreCleanupStarted {
        /// The names of the run.
        names: &'a RunNames,
    },

    /// The script config map is being created.
    ScriptUploading {
        /// The name of the config map.
        config_map_name: &'a str,
    },

    /// The `TestRun` is being created.
    TestRunCreating {
        /// The name of the `TestRun`.
        resource_name: &'a str,
        /// The number of run jobs requested.
        parallelism: u32,
        /// The arguments passed to `k6 run`.
        arguments: &'a str,
        /// The names of the runner's environment variables. Values are not reported.
        env_names: Vec<&'a str>,
    },

    /// Waiting for the `TestRun` to reach a stage.
    WaitingForStage {
        /// The name of the `TestRun`.
        resource_name: &'a str,
        /// The stage being waited for.
        stage: Stage,
        /// How long the wait may take.
        timeout: Duration,
    },

    /// The `TestRun` reached the stage that was being waited for, or a later one.
    StageReached {
        /// The name of the `TestRun`.
        resource_name: &'a str,
        /// The stage that was being waited for.
        expected: Stage,
        /// The stage that was observed.
        observed: Stage,
    },

    /// Waiting for the initializer job.
    WaitingForJob {
        /// The name of the job.
        job_name: &'a str,
        /// How long the wait may take.
        timeout: Duration,
    },

    /// The initializer job succeeded.
    JobCompleted {
        /// The name of the job.
        job_name: &'a str,
    },

    /// Waiting for the run jobs.
    WaitingForRunJobs {
        /// The number of run jobs.
        parallelism: u32,
        /// How long the wait may take.
        timeout: Duration,
    },

    /// The live log stream of a single-replica run was opened.
    LogStreamStarted {
        /// The job whose logs are being followed.
        job_name: &'a str,
    },

    /// Output from the live log stream.
    LogChunk {
        /// The output.
        chunk: &'a Bytes,
    },

    /// The live log stream ended before its job completed.
    LogStreamFinished,

    /// The live log stream could not be opened, or broke. The run continues.
    LogStreamFailed {
        /// The error.
        error: &'a StoreError,
    },

    /// Logs of one replica of a successful parallel run.
    ReplicaLogs {
        /// The name of the replica's job.
        job_name: &'a str,
        /// The logs of the replica since the start of the run, or why they could not be read.
        logs: Result<&'a str, &'a StoreError>,
    },

    /// Diagnostics were gathered after a failure.
    DiagnosticsCollected {
        /// The gathered diagnostics.
        report: &'a DiagnosticReport,
    },

    /// The run's objects are being deleted.
    CleanupStarted {
        /// The names of the run.
        names: &'a RunNames,
    },

    /// The run's objects were deleted, or deleting them failed.
    CleanupFinished {
        /// The error, if cleanup failed.
        error: Option<&'a CleanupError>,
    },

    /// The run is over.
    RunFinished {
        /// The outcome of the run and of cleanup.
        report: &'a RunReport,
    },
}
