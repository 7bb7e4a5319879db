// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::StageWaitError, stage::Stage, store::ResourceStore, time::PollSchedule};
use std::time::Duration;
use tracing::debug;

/// Waits for a `TestRun` to reach a stage.
#[derive(Clone, Copy)]
pub struct StagePoller<'a> {
    store: &'a dyn ResourceStore,
    interval: Duration,
}

impl<'a> StagePoller<'a> {
    /// Creates a new poller that reads the stage every `interval`.
    pub fn new(store: &'a dyn ResourceStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Waits until the stage of `resource_name` is `expected` or later.
    ///
    /// Returns the stage that satisfied the wait. Observing [`Stage::Error`] ends the wait
    /// immediately, however much of the timeout is left.
    pub async fn wait_for_stage(
        &self,
        resource_name: &str,
        expected: Stage,
        timeout: Duration,
    ) -> Result<Stage, StageWaitError> {
        let schedule = PollSchedule::new(self.interval, timeout);
        let mut last_observed = None;
        let mut last_error = None;

        loop {
            match schedule.read(self.store.get_stage(resource_name)).await {
                Some(Ok(stage)) => {
                    debug!("test run `{resource_name}` is at stage `{stage}`, waiting for `{expected}`");
                    if stage.is_error() {
                        return Err(StageWaitError::ErrorStage {
                            resource_name: resource_name.to_owned(),
                        });
                    }
                    if stage >= expected {
                        return Ok(stage);
                    }
                    last_observed = Some(stage);
                    last_error = None;
                }
                Some(Err(err)) => {
                    debug!("reading stage of test run `{resource_name}` failed, retrying: {err}");
                    last_error = Some(err);
                }
                None => break,
            }

            if !schedule.wait_next().await {
                break;
            }
        }

        Err(StageWaitError::Timeout {
            resource_name: resource_name.to_owned(),
            expected,
            timeout,
            last_observed,
            last_error,
        })
    }
}
