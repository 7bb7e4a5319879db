// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logs gathered when a run fails.
//!
//! Diagnostics are best-effort. A failure to gather them is recorded in the
//! [`DiagnosticReport`] next to whatever else was gathered, and never replaces the error that
//! caused the run to fail.

use crate::{
    config::OperatorConfig,
    errors::StoreError,
    store::{PodLogs, ResourceStore},
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::debug;

/// Which job logs to gather alongside the operator's logs.
#[derive(Clone, Copy, Debug)]
pub enum JobLogsRequest<'a> {
    /// Only the operator's logs.
    None,
    /// The full logs of every pod of one job.
    PerPod(&'a str),
    /// The logs of each of these jobs since the start of the run.
    SinceStart(&'a [String]),
}

/// Diagnostics gathered for one failure.
#[derive(Debug, Default)]
pub struct DiagnosticReport {
    /// Warning and error lines logged by the operator, if they were requested.
    pub operator_logs: Option<Result<OperatorLogs, StoreError>>,
    /// Logs of the jobs involved in the failure.
    pub jobs: Vec<JobDiagnostics>,
}

impl DiagnosticReport {
    /// Returns true if nothing was gathered.
    pub fn is_empty(&self) -> bool {
        self.operator_logs.is_none() && self.jobs.is_empty()
    }
}

/// The warning and error lines from the operator's logs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperatorLogs {
    lines: Vec<String>,
}

impl OperatorLogs {
    /// Keeps the lines of `logs` that contain `ERROR` or `WARN`.
    pub fn filter(logs: &str) -> Self {
        let lines = logs
            .lines()
            .filter(|line| line.contains("ERROR") || line.contains("WARN"))
            .map(str::to_owned)
            .collect();
        Self { lines }
    }

    /// Returns the kept lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns true if the operator logged no warnings or errors.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Logs for one job.
#[derive(Debug)]
pub struct JobDiagnostics {
    /// The name of the job.
    pub job_name: String,
    /// The job's logs, or the reason they could not be read.
    pub logs: Result<JobLogs, StoreError>,
}

/// The logs of a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobLogs {
    /// The full logs of each pod, tagged by pod name.
    PerPod(Vec<PodLogs>),
    /// The logs of all pods since the start of the run.
    SinceStart(String),
}

/// Gathers logs from the operator and from jobs.
#[derive(Clone, Copy)]
pub struct DiagnosticsCollector<'a> {
    store: &'a dyn ResourceStore,
    operator: &'a OperatorConfig,
}

impl<'a> DiagnosticsCollector<'a> {
    /// Creates a new collector.
    pub fn new(store: &'a dyn ResourceStore, operator: &'a OperatorConfig) -> Self {
        Self { store, operator }
    }

    /// Returns the warning and error lines the operator logged since `since`.
    pub async fn operator_logs_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<OperatorLogs, StoreError> {
        let logs = self
            .store
            .controller_logs(since, &self.operator.label_selector, &self.operator.container)
            .await?;
        Ok(OperatorLogs::filter(&logs))
    }

    /// Returns the full logs of each pod backing `job_name`.
    pub async fn job_pod_logs(&self, job_name: &str) -> Result<Vec<PodLogs>, StoreError> {
        self.store.job_pod_logs(job_name).await
    }

    /// Returns the logs of `job_name` since `since`.
    pub async fn job_logs_since(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        self.store.pod_logs_since(job_name, since).await
    }

    /// Gathers the operator's logs along with the requested job logs.
    pub async fn collect(&self, since: DateTime<Utc>, jobs: JobLogsRequest<'_>) -> DiagnosticReport {
        debug!("collecting diagnostics");
        let operator_logs = Some(self.operator_logs_since(since).await);
        let jobs = match jobs {
            JobLogsRequest::None => Vec::new(),
            JobLogsRequest::PerPod(job_name) => vec![JobDiagnostics {
                job_name: job_name.to_owned(),
                logs: self.job_pod_logs(job_name).await.map(JobLogs::PerPod),
            }],
            JobLogsRequest::SinceStart(job_names) => {
                join_all(job_names.iter().map(|job_name| async move {
                    JobDiagnostics {
                        job_name: job_name.clone(),
                        logs: self
                            .job_logs_since(job_name, since)
                            .await
                            .map(JobLogs::SinceStart),
                    }
                }))
                .await
            }
        };

        DiagnosticReport {
            operator_logs,
            jobs,
        }
    }
}
