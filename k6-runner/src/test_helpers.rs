// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory [`ResourceStore`] whose observations are scripted against tokio's clock.
//!
//! Tests run with a paused clock, so a timeline entry at `(5, value)` becomes visible exactly five
//! virtual seconds after the store was created.

use crate::{
    errors::StoreError,
    manifest::ScriptSource,
    naming::RunNames,
    stage::{JobCounters, Stage},
    store::{LogStream, ObjectKind, ObjectPayload, PodLogs, ResourceStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;

/// How a scripted log stream ends after its chunks.
#[derive(Clone, Copy, Debug)]
pub(crate) enum StreamEnd {
    Eof,
    Error,
    Hang,
}

type Timeline<T> = Vec<(Duration, T)>;

#[derive(Default)]
struct State {
    objects: BTreeSet<(ObjectKind, String)>,
    lingering: HashMap<(ObjectKind, String), Instant>,
    delete_linger: HashMap<ObjectKind, Duration>,
    failing_creates: HashSet<ObjectKind>,
    failing_deletes: HashSet<ObjectKind>,
    stages: HashMap<String, Timeline<Stage>>,
    stage_read_failures: HashMap<String, usize>,
    jobs: HashMap<String, Timeline<JobCounters>>,
    pod_logs: HashMap<String, Vec<PodLogs>>,
    pod_log_delays: HashMap<String, Duration>,
    streams: HashMap<String, (Vec<&'static str>, StreamEnd)>,
    stream_available_at: HashMap<String, Duration>,
    controller_pods: Vec<PodLogs>,

    creates: Vec<(ObjectKind, String)>,
    deletes: Vec<(ObjectKind, String)>,
    get_calls: HashMap<ObjectKind, usize>,
    counter_reads: HashMap<String, usize>,
    log_requests: Vec<String>,
    controller_log_requests: Vec<(String, String)>,
}

pub(crate) struct MemoryStore {
    origin: Instant,
    since: DateTime<Utc>,
    state: Mutex<State>,
    open_streams: Arc<Mutex<Vec<String>>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            since: Utc::now(),
            state: Mutex::new(State::default()),
            open_streams: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The "since" cursor to pass to waits.
    pub(crate) fn since(&self) -> DateTime<Utc> {
        self.since
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    // ---
    // Scripting
    // ---

    pub(crate) fn set_stage_timeline(
        &self,
        resource_name: &str,
        timeline: impl IntoIterator<Item = (u64, Stage)>,
    ) {
        self.state()
            .stages
            .insert(resource_name.to_owned(), to_timeline(timeline));
    }

    /// Makes the next `count` stage reads fail with a request error.
    pub(crate) fn fail_stage_reads(&self, resource_name: &str, count: usize) {
        self.state()
            .stage_read_failures
            .insert(resource_name.to_owned(), count);
    }

    pub(crate) fn set_job_timeline(
        &self,
        job_name: &str,
        timeline: impl IntoIterator<Item = (u64, JobCounters)>,
    ) {
        self.state()
            .jobs
            .insert(job_name.to_owned(), to_timeline(timeline));
    }

    pub(crate) fn set_pod_logs<'a>(
        &self,
        job_name: &str,
        pods: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        let pods = pods
            .into_iter()
            .map(|(pod_name, logs)| PodLogs {
                pod_name: pod_name.to_owned(),
                logs: logs.to_owned(),
            })
            .collect();
        self.state().pod_logs.insert(job_name.to_owned(), pods);
    }

    /// Makes reading the since-start logs of `job_name` take `secs` seconds.
    pub(crate) fn delay_pod_logs(&self, job_name: &str, secs: u64) {
        self.state()
            .pod_log_delays
            .insert(job_name.to_owned(), Duration::from_secs(secs));
    }

    pub(crate) fn set_log_stream(
        &self,
        job_name: &str,
        chunks: impl IntoIterator<Item = &'static str>,
        end: StreamEnd,
    ) {
        self.state()
            .streams
            .insert(job_name.to_owned(), (chunks.into_iter().collect(), end));
    }

    /// Makes opening the log stream of `job_name` fail with `NoPods` until `secs` have passed.
    pub(crate) fn set_stream_available_at(&self, job_name: &str, secs: u64) {
        self.state()
            .stream_available_at
            .insert(job_name.to_owned(), Duration::from_secs(secs));
    }

    pub(crate) fn set_controller_logs(&self, pod_name: &str, logs: &str) {
        self.state().controller_pods.push(PodLogs {
            pod_name: pod_name.to_owned(),
            logs: logs.to_owned(),
        });
    }

    pub(crate) fn insert_run_objects(&self, names: &RunNames, script: &ScriptSource) {
        let mut state = self.state();
        if script.config_map(names).is_some() {
            state
                .objects
                .insert((ObjectKind::ConfigMap, names.config_map_name().to_owned()));
        }
        state
            .objects
            .insert((ObjectKind::TestRun, names.resource_name().to_owned()));
    }

    /// Deleted objects of this kind stay visible for `linger` after the delete is accepted.
    pub(crate) fn set_delete_linger(&self, kind: ObjectKind, linger: Duration) {
        self.state().delete_linger.insert(kind, linger);
    }

    pub(crate) fn fail_creates(&self, kind: ObjectKind) {
        self.state().failing_creates.insert(kind);
    }

    pub(crate) fn fail_deletes(&self, kind: ObjectKind) {
        self.state().failing_deletes.insert(kind);
    }

    // ---
    // Inspection
    // ---

    pub(crate) fn objects(&self) -> Vec<(ObjectKind, String)> {
        self.state().objects.iter().cloned().collect()
    }

    pub(crate) fn creates(&self) -> Vec<(ObjectKind, String)> {
        self.state().creates.clone()
    }

    pub(crate) fn deletes(&self) -> Vec<(ObjectKind, String)> {
        self.state().deletes.clone()
    }

    pub(crate) fn get_calls(&self, kind: ObjectKind) -> usize {
        self.state().get_calls.get(&kind).copied().unwrap_or(0)
    }

    pub(crate) fn counter_reads(&self, job_name: &str) -> usize {
        self.state()
            .counter_reads
            .get(job_name)
            .copied()
            .unwrap_or(0)
    }

    /// Jobs whose pod logs were requested, in order.
    pub(crate) fn log_requests(&self) -> Vec<String> {
        self.state().log_requests.clone()
    }

    pub(crate) fn controller_log_requests(&self) -> Vec<(String, String)> {
        self.state().controller_log_requests.clone()
    }

    /// Jobs whose log streams have been opened and not yet dropped.
    pub(crate) fn open_streams(&self) -> Vec<String> {
        self.open_streams.lock().unwrap().clone()
    }

    fn job_pods(&self, job_name: &str) -> Result<Vec<PodLogs>, StoreError> {
        let mut state = self.state();
        state.log_requests.push(job_name.to_owned());
        match state.pod_logs.get(job_name) {
            Some(pods) if !pods.is_empty() => Ok(pods.clone()),
            _ => Err(StoreError::NoPods {
                job_name: job_name.to_owned(),
            }),
        }
    }
}

fn to_timeline<T>(timeline: impl IntoIterator<Item = (u64, T)>) -> Timeline<T> {
    timeline
        .into_iter()
        .map(|(secs, value)| (Duration::from_secs(secs), value))
        .collect()
}

fn observe<T: Copy>(timeline: Option<&Timeline<T>>, elapsed: Duration) -> Option<T> {
    timeline?
        .iter()
        .rev()
        .find(|(at, _)| *at <= elapsed)
        .map(|(_, value)| *value)
}

struct OpenStreamGuard {
    job_name: String,
    open_streams: Arc<Mutex<Vec<String>>>,
}

impl Drop for OpenStreamGuard {
    fn drop(&mut self) {
        let mut open = self.open_streams.lock().unwrap();
        if let Some(pos) = open.iter().position(|name| *name == self.job_name) {
            open.remove(pos);
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn create_object(&self, payload: &ObjectPayload) -> Result<(), StoreError> {
        let mut state = self.state();
        let key = (payload.kind(), payload.name().to_owned());
        state.creates.push(key.clone());
        if state.failing_creates.contains(&payload.kind()) {
            return Err(StoreError::request(
                format!("create {} `{}`", key.0, key.1),
                "admission webhook denied the request",
            ));
        }
        if !state.objects.insert(key.clone()) {
            return Err(StoreError::request(
                format!("create {} `{}`", key.0, key.1),
                "already exists",
            ));
        }
        Ok(())
    }

    async fn get_object(&self, kind: ObjectKind, name: &str) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut state = self.state();
        *state.get_calls.entry(kind).or_default() += 1;
        let key = (kind, name.to_owned());
        let lingering = state.lingering.get(&key).is_some_and(|until| now < *until);
        if state.objects.contains(&key) || lingering {
            Ok(())
        } else {
            Err(StoreError::not_found(kind, name))
        }
    }

    async fn delete_object(&self, kind: ObjectKind, name: &str) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut state = self.state();
        let key = (kind, name.to_owned());
        state.deletes.push(key.clone());
        if state.failing_deletes.contains(&kind) {
            return Err(StoreError::request(
                format!("delete {kind} `{name}`"),
                "connection refused",
            ));
        }
        if !state.objects.remove(&key) {
            return Err(StoreError::not_found(kind, name));
        }
        if let Some(linger) = state.delete_linger.get(&kind).copied() {
            state.lingering.insert(key, now + linger);
        }
        Ok(())
    }

    async fn get_stage(&self, resource_name: &str) -> Result<Stage, StoreError> {
        let elapsed = self.elapsed();
        let mut state = self.state();
        if let Some(count) = state.stage_read_failures.get_mut(resource_name) {
            if *count > 0 {
                *count -= 1;
                return Err(StoreError::request(
                    format!("get test run `{resource_name}`"),
                    "connection refused",
                ));
            }
        }
        observe(state.stages.get(resource_name), elapsed)
            .ok_or_else(|| StoreError::not_found(ObjectKind::TestRun, resource_name))
    }

    async fn get_job_counters(&self, job_name: &str) -> Result<JobCounters, StoreError> {
        let elapsed = self.elapsed();
        let mut state = self.state();
        *state.counter_reads.entry(job_name.to_owned()).or_default() += 1;
        observe(state.jobs.get(job_name), elapsed)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Job, job_name))
    }

    async fn pod_logs_since(
        &self,
        job_name: &str,
        _since: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let delay = self.state().pod_log_delays.get(job_name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let pods = self.job_pods(job_name)?;
        Ok(pods.into_iter().map(|pod| pod.logs).collect())
    }

    async fn job_pod_logs(&self, job_name: &str) -> Result<Vec<PodLogs>, StoreError> {
        self.job_pods(job_name)
    }

    async fn stream_pod_logs(
        &self,
        job_name: &str,
        _since: DateTime<Utc>,
    ) -> Result<LogStream, StoreError> {
        let elapsed = self.elapsed();
        let state = self.state();
        let no_pods = || StoreError::NoPods {
            job_name: job_name.to_owned(),
        };
        if state
            .stream_available_at
            .get(job_name)
            .is_some_and(|at| elapsed < *at)
        {
            return Err(no_pods());
        }
        let (chunks, end) = state.streams.get(job_name).cloned().ok_or_else(no_pods)?;

        self.open_streams.lock().unwrap().push(job_name.to_owned());
        let guard = OpenStreamGuard {
            job_name: job_name.to_owned(),
            open_streams: self.open_streams.clone(),
        };

        let chunks = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes()))),
        );
        let end: LogStream = match end {
            StreamEnd::Eof => stream::empty().boxed(),
            StreamEnd::Error => stream::once(async {
                Err(StoreError::request("read log stream", "stream reset"))
            })
            .boxed(),
            StreamEnd::Hang => stream::pending().boxed(),
        };
        Ok(chunks
            .chain(end)
            .map(move |item| {
                let _guard = &guard;
                item
            })
            .boxed())
    }

    async fn controller_logs(
        &self,
        _since: DateTime<Utc>,
        label_selector: &str,
        container: &str,
    ) -> Result<String, StoreError> {
        let mut state = self.state();
        state
            .controller_log_requests
            .push((label_selector.to_owned(), container.to_owned()));
        if state.controller_pods.is_empty() {
            return Err(StoreError::NoMatchingPods {
                label_selector: label_selector.to_owned(),
            });
        }
        Ok(state
            .controller_pods
            .iter()
            .map(|pod| pod.logs.as_str())
            .collect())
    }
}
