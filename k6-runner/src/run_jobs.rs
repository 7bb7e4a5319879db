// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervising the run jobs of a `TestRun`.
//!
//! Every replica gets its own [`JobWaiter`], all started together with the same timeout. The
//! coordinator waits for every one of them, so that a failure in one replica never hides the
//! outcome of another. Results are collected by replica index.
//!
//! With a single replica, the replica's logs are also followed live while its waiter runs.

use crate::{
    errors::{JobWaitError, ReplicaFailure, RunJobsError, StoreError},
    naming::RunNames,
    store::{LogStream, ResourceStore},
    wait::JobWaiter,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{
    FutureExt, StreamExt,
    future::{BoxFuture, join_all},
};
use std::{pin::pin, time::Duration};
use tracing::debug;

/// An event from the live log stream of a single-replica run.
#[derive(Debug)]
pub enum LogStreamEvent {
    /// The stream was opened.
    Started {
        /// The job whose logs are being followed.
        job_name: String,
    },
    /// Log output.
    Chunk(Bytes),
    /// The stream could not be opened, or broke while being read. It is not retried.
    Failed(StoreError),
    /// The stream ended before the job completed.
    Ended,
}

/// Waits for all run jobs of a `TestRun`.
#[derive(Clone, Copy)]
pub struct RunJobsCoordinator<'a> {
    store: &'a dyn ResourceStore,
    names: &'a RunNames,
    interval: Duration,
}

impl<'a> RunJobsCoordinator<'a> {
    /// Creates a new coordinator for the run jobs of `names`.
    pub fn new(store: &'a dyn ResourceStore, names: &'a RunNames, interval: Duration) -> Self {
        Self {
            store,
            names,
            interval,
        }
    }

    /// Waits for all `parallelism` run jobs to complete.
    ///
    /// Returns only once every replica has succeeded, failed or timed out. `on_log` receives the
    /// live log stream when there is exactly one replica.
    pub async fn wait_for_all(
        &self,
        parallelism: u32,
        since: DateTime<Utc>,
        timeout: Duration,
        on_log: &mut dyn FnMut(LogStreamEvent),
    ) -> Result<(), RunJobsError> {
        let parallelism = parallelism as usize;
        let results = if parallelism == 1 {
            vec![self.wait_with_logs(since, timeout, on_log).await]
        } else {
            let waiter = JobWaiter::new(self.store, self.interval);
            let job_names: Vec<_> = (0..parallelism)
                .map(|index| self.names.runner_job_name(index))
                .collect();
            debug!("waiting for run jobs: {}", job_names.join(", "));
            join_all(
                job_names
                    .iter()
                    .map(|job_name| waiter.wait_for_completion(job_name, since, timeout)),
            )
            .await
        };

        let failures = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, res)| res.err().map(|error| ReplicaFailure { index, error }))
            .collect();
        match RunJobsError::new(parallelism, failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn wait_with_logs(
        &self,
        since: DateTime<Utc>,
        timeout: Duration,
        on_log: &mut dyn FnMut(LogStreamEvent),
    ) -> Result<(), JobWaitError> {
        let job_name = self.names.runner_job_name(0);
        let waiter = JobWaiter::new(self.store, self.interval);
        let mut wait = pin!(waiter.wait_for_completion(&job_name, since, timeout));
        let mut follower = LogFollower::new(self.store, &job_name, since, self.interval);

        // The stream is dropped as soon as the waiter returns, whatever state it is in.
        loop {
            tokio::select! {
                res = &mut wait => return res,
                event = follower.next_event(), if !follower.is_done() => on_log(event),
            }
        }
    }
}

enum FollowerState<'a> {
    Opening(BoxFuture<'a, Result<LogStream, StoreError>>),
    Streaming(LogStream),
    Done,
}

struct LogFollower<'a> {
    job_name: &'a str,
    state: FollowerState<'a>,
}

impl<'a> LogFollower<'a> {
    fn new(
        store: &'a dyn ResourceStore,
        job_name: &'a str,
        since: DateTime<Utc>,
        interval: Duration,
    ) -> Self {
        // The job's pod may not have been scheduled yet.
        let open = async move {
            loop {
                match store.stream_pod_logs(job_name, since).await {
                    Err(StoreError::NoPods { .. }) => tokio::time::sleep(interval).await,
                    res => return res,
                }
            }
        }
        .boxed();

        Self {
            job_name,
            state: FollowerState::Opening(open),
        }
    }

    fn is_done(&self) -> bool {
        matches!(self.state, FollowerState::Done)
    }

    async fn next_event(&mut self) -> LogStreamEvent {
        match &mut self.state {
            FollowerState::Opening(open) => match open.await {
                Ok(stream) => {
                    self.state = FollowerState::Streaming(stream);
                    LogStreamEvent::Started {
                        job_name: self.job_name.to_owned(),
                    }
                }
                Err(err) => {
                    self.state = FollowerState::Done;
                    LogStreamEvent::Failed(err)
                }
            },
            FollowerState::Streaming(stream) => match stream.next().await {
                Some(Ok(chunk)) => LogStreamEvent::Chunk(chunk),
                Some(Err(err)) => {
                    self.state = FollowerState::Done;
                    LogStreamEvent::Failed(err)
                }
                None => {
                    self.state = FollowerState::Done;
                    LogStreamEvent::Ended
                }
            },
            FollowerState::Done => std::future::pending().await,
        }
    }
}
