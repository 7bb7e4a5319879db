// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};

/// Timeouts for each phase of a run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeoutsConfig {
    /// Waiting for the `initialization` stage.
    #[serde(with = "humantime_serde")]
    pub initialization_stage: Duration,
    /// Waiting for the initializer job.
    #[serde(with = "humantime_serde")]
    pub init_job: Duration,
    /// Waiting for the `created` stage.
    #[serde(with = "humantime_serde")]
    pub created_stage: Duration,
    /// Waiting for all run jobs.
    #[serde(with = "humantime_serde")]
    pub run_jobs: Duration,
    /// Cleaning up the run's objects.
    #[serde(with = "humantime_serde")]
    pub cleanup: Duration,
    /// Confirming that one deleted object is gone.
    #[serde(with = "humantime_serde")]
    pub delete_confirm: Duration,
}

/// How often each wait polls the cluster.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollIntervalsConfig {
    /// Reading the `TestRun` stage.
    #[serde(with = "humantime_serde")]
    pub stage: Duration,
    /// Reading the initializer job's counters.
    #[serde(with = "humantime_serde")]
    pub init_job: Duration,
    /// Reading each run job's counters.
    #[serde(with = "humantime_serde")]
    pub run_job: Duration,
    /// Checking whether a deleted object is gone.
    #[serde(with = "humantime_serde")]
    pub delete_confirm: Duration,
}

/// Where the k6 operator's own logs are read from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OperatorConfig {
    /// Label selector matching the operator's pods.
    pub label_selector: String,
    /// The container within those pods.
    pub container: String,
}

/// Defaults for the run itself.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// Number of run jobs.
    pub parallelism: u32,
    /// Extra arguments for `k6 run`.
    #[serde(default)]
    pub arguments: String,
    /// A custom runner image.
    #[serde(default)]
    pub image: Option<String>,
    /// The pull secret used with a custom runner image. An empty string means none.
    #[serde(default)]
    pub image_pull_secret: Option<String>,
    /// Environment variables for the runner pods.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
