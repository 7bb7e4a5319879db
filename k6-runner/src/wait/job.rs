// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{JobFailureLogs, JobWaitError, StoreError},
    stage::JobOutcome,
    store::ResourceStore,
    time::PollSchedule,
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};

/// Waits for a batch job to complete.
///
/// Completion is read from the job's `succeeded` and `failed` counters: the job is done when
/// exactly one of them is 1.
#[derive(Clone, Copy)]
pub struct JobWaiter<'a> {
    store: &'a dyn ResourceStore,
    interval: Duration,
}

impl<'a> JobWaiter<'a> {
    /// Creates a new waiter that reads the counters every `interval`.
    pub fn new(store: &'a dyn ResourceStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Waits until `job_name` succeeds or fails.
    ///
    /// If the job fails, its logs since `since` are attached to the error. A failure to read the
    /// logs is attached instead, and never replaces the job failure.
    pub async fn wait_for_completion(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<(), JobWaitError> {
        let schedule = PollSchedule::new(self.interval, timeout);
        let mut last_counters = None;
        let mut last_error = None;
        let mut warned_anomalous = false;

        loop {
            match schedule.read(self.store.get_job_counters(job_name)).await {
                Some(Ok(counters)) => {
                    debug!("job `{job_name}`: {counters}");
                    match counters.outcome() {
                        Some(JobOutcome::Succeeded) => return Ok(()),
                        Some(JobOutcome::Failed) => {
                            return Err(self.failed(job_name, since, &schedule).await);
                        }
                        None if counters.is_anomalous() && !warned_anomalous => {
                            warn!(
                                "job `{job_name}` reports unexpected counters ({counters}), \
                                 treating it as still running"
                            );
                            warned_anomalous = true;
                        }
                        None => {}
                    }
                    last_counters = Some(counters);
                    last_error = None;
                }
                Some(Err(err)) if err.is_not_found() => {
                    debug!("job `{job_name}` has not been created yet");
                    last_error = Some(err);
                }
                Some(Err(err)) => {
                    debug!("reading counters of job `{job_name}` failed, retrying: {err}");
                    last_error = Some(err);
                }
                None => break,
            }

            if !schedule.wait_next().await {
                break;
            }
        }

        Err(JobWaitError::Timeout {
            job_name: job_name.to_owned(),
            timeout,
            last_counters,
            last_error,
        })
    }

    async fn failed(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
        schedule: &PollSchedule,
    ) -> JobWaitError {
        let fetched = schedule
            .read(self.store.pod_logs_since(job_name, since))
            .await
            .unwrap_or_else(|| {
                Err(StoreError::DeadlineElapsed {
                    operation: format!("read logs of job `{job_name}`"),
                })
            });
        let logs = match fetched {
            Ok(logs) => JobFailureLogs::Captured(logs),
            Err(err) => {
                warn!("failed to retrieve logs of failed job `{job_name}`: {err}");
                JobFailureLogs::Unavailable(err)
            }
        };
        JobWaitError::Failed {
            job_name: job_name.to_owned(),
            logs,
        }
    }
}
