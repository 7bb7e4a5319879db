// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access to the cluster objects that make up a run.
//!
//! Everything kubectl-k6 does against the cluster goes through the [`ResourceStore`] trait. The
//! operator's loosely-typed status documents are projected into [`Stage`] and [`JobCounters`]
//! inside the store, so nothing past this boundary sees raw JSON.

mod k8s;

pub use self::k8s::KubeStore;

use crate::{
    errors::StoreError,
    manifest::{ScriptConfigMap, TestRunManifest},
    stage::{JobCounters, Stage},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::fmt;

/// The kinds of objects kubectl-k6 reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// A config map holding the script.
    ConfigMap,
    /// The `TestRun` custom resource.
    TestRun,
    /// A job created by the operator.
    Job,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConfigMap => "config map",
            Self::TestRun => "test run",
            Self::Job => "job",
        };
        f.write_str(s)
    }
}

/// An object to create.
#[derive(Clone, Debug)]
pub enum ObjectPayload {
    /// A script config map.
    ConfigMap(ScriptConfigMap),
    /// A `TestRun`.
    TestRun(TestRunManifest),
}

impl ObjectPayload {
    /// Returns the kind of object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::ConfigMap(_) => ObjectKind::ConfigMap,
            Self::TestRun(_) => ObjectKind::TestRun,
        }
    }

    /// Returns the name of the object.
    pub fn name(&self) -> &str {
        match self {
            Self::ConfigMap(config_map) => &config_map.name,
            Self::TestRun(manifest) => manifest.name(),
        }
    }
}

/// The full logs of one pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodLogs {
    /// The name of the pod.
    pub pod_name: String,
    /// The pod's output. Empty if the pod did not log anything.
    pub logs: String,
}

/// A live stream of log output.
pub type LogStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// The cluster operations kubectl-k6 needs.
///
/// All operations are scoped to a single namespace, fixed when the store is created.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Creates an object.
    async fn create_object(&self, payload: &ObjectPayload) -> Result<(), StoreError>;

    /// Checks that an object exists, returning [`StoreError::NotFound`] if it doesn't.
    async fn get_object(&self, kind: ObjectKind, name: &str) -> Result<(), StoreError>;

    /// Requests deletion of an object. Returns [`StoreError::NotFound`] if it's already gone.
    async fn delete_object(&self, kind: ObjectKind, name: &str) -> Result<(), StoreError>;

    /// Reads the stage reported in a `TestRun`'s status.
    async fn get_stage(&self, resource_name: &str) -> Result<Stage, StoreError>;

    /// Reads a job's completion counters.
    async fn get_job_counters(&self, job_name: &str) -> Result<JobCounters, StoreError>;

    /// Returns the logs of every pod backing a job since `since`, concatenated.
    async fn pod_logs_since(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
    ) -> Result<String, StoreError>;

    /// Returns the full logs of every pod backing a job, one entry per pod.
    async fn job_pod_logs(&self, job_name: &str) -> Result<Vec<PodLogs>, StoreError>;

    /// Follows the logs of a job's pod, starting at `since`.
    async fn stream_pod_logs(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
    ) -> Result<LogStream, StoreError>;

    /// Returns the logs of the operator's controller pods since `since`, concatenated.
    ///
    /// Controller pods are those matching `label_selector`; only `container` is read.
    async fn controller_logs(
        &self,
        since: DateTime<Utc>,
        label_selector: &str,
        container: &str,
    ) -> Result<String, StoreError>;
}
