// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The sequence that drives one run.
//!
//! A run goes through these phases, stopping at the first failure:
//!
//! 1. Delete any leftover objects with the run's names.
//! 2. Upload the script config map, for inline scripts.
//! 3. Create the `TestRun`.
//! 4. Wait for the `initialization` stage.
//! 5. Wait for the initializer job.
//! 6. Wait for the `created` stage.
//! 7. Wait for every run job.
//!
//! When a wait fails, diagnostics are gathered before the run ends. Whatever happens, the run's
//! objects are deleted afterwards, and the result of that is reported separately from the run's
//! own outcome.

use crate::{
    cleanup::CleanupCoordinator,
    config::OrchestratorConfig,
    diagnostics::{DiagnosticReport, DiagnosticsCollector, JobLogsRequest},
    errors::{CleanupError, RunError, StageWaitError},
    manifest::{RunnerSettings, ScriptSource, TestRunManifest},
    naming::RunNames,
    reporter::{RunEvent, RunEventKind},
    run_jobs::{LogStreamEvent, RunJobsCoordinator},
    stage::Stage,
    store::{ObjectPayload, ResourceStore},
    time::{StopwatchStart, stopwatch},
    wait::{JobWaiter, StagePoller},
};
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info};

/// Everything needed to start one run.
#[derive(Clone, Debug)]
pub struct RunRequest {
    /// The names of the run's objects.
    pub names: RunNames,
    /// The number of run jobs.
    pub parallelism: u32,
    /// The script.
    pub script: ScriptSource,
    /// Runner settings.
    pub runner: RunnerSettings,
}

/// The result of a run attempt.
#[derive(Debug)]
pub struct RunReport {
    /// Whether the run itself succeeded.
    pub outcome: Result<RunSummary, RunFailure>,
    /// Whether the run's objects were deleted. This never changes `outcome`.
    pub cleanup: Result<(), CleanupError>,
}

impl RunReport {
    /// Returns true if both the run and cleanup succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok() && self.cleanup.is_ok()
    }
}

/// A summary of a successful run.
#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    /// The number of run jobs.
    pub parallelism: u32,
    /// How long the run took, excluding cleanup.
    pub duration: Duration,
}

/// Why a run failed, along with what could be found out about it.
#[derive(Debug)]
pub struct RunFailure {
    /// The error that ended the run.
    pub error: RunError,
    /// Diagnostics gathered after the error.
    pub diagnostics: DiagnosticReport,
}

/// Drives runs against a [`ResourceStore`].
#[derive(Clone, Copy)]
pub struct Orchestrator<'a> {
    store: &'a dyn ResourceStore,
    config: &'a OrchestratorConfig,
}

impl<'a> Orchestrator<'a> {
    /// Creates a new orchestrator.
    pub fn new(store: &'a dyn ResourceStore, config: &'a OrchestratorConfig) -> Self {
        Self { store, config }
    }

    /// Performs a run, reporting progress through `callback`.
    ///
    /// The last event is always [`RunEventKind::RunFinished`].
    pub async fn run<F>(&self, request: &RunRequest, mut callback: F) -> RunReport
    where
        F: FnMut(RunEvent<'_>),
    {
        let mut ctx = RunContext {
            stopwatch: stopwatch(),
            callback: &mut callback,
        };

        let outcome = self.run_phases(request, &mut ctx).await;

        ctx.emit(RunEventKind::CleanupStarted {
            names: &request.names,
        });
        let cleanup = self.cleanup().delete_run_resources(&request.names).await;
        ctx.emit(RunEventKind::CleanupFinished {
            error: cleanup.as_ref().err(),
        });

        let report = RunReport { outcome, cleanup };
        ctx.emit(RunEventKind::RunFinished { report: &report });
        report
    }

    async fn run_phases(
        &self,
        request: &RunRequest,
        ctx: &mut RunContext<'_>,
    ) -> Result<RunSummary, RunFailure> {
        let names = &request.names;
        let timeouts = &self.config.timeouts;
        let intervals = &self.config.poll_intervals;
        let since = ctx.stopwatch.start_time();

        ctx.emit(RunEventKind::PreCleanupStarted { names });
        self.cleanup()
            .delete_run_resources(names)
            .await
            .map_err(|err| RunFailure::without_diagnostics(RunError::PreCleanup(err)))?;

        if let Some(config_map) = request.script.config_map(names) {
            ctx.emit(RunEventKind::ScriptUploading {
                config_map_name: &config_map.name,
            });
            let name = config_map.name.clone();
            self.store
                .create_object(&ObjectPayload::ConfigMap(config_map))
                .await
                .map_err(|err| {
                    RunFailure::without_diagnostics(RunError::UploadScript { name, err })
                })?;
        }

        let manifest = TestRunManifest::new(
            names,
            request.parallelism,
            &request.script,
            &request.runner,
        );
        ctx.emit(RunEventKind::TestRunCreating {
            resource_name: manifest.name(),
            parallelism: request.parallelism,
            arguments: &manifest.spec.arguments,
            env_names: manifest.env_names(),
        });
        self.store
            .create_object(&ObjectPayload::TestRun(manifest))
            .await
            .map_err(|err| {
                RunFailure::without_diagnostics(RunError::CreateTestRun {
                    name: names.resource_name().to_owned(),
                    err,
                })
            })?;
        info!("created test run `{}`", names.resource_name());

        let poller = StagePoller::new(self.store, intervals.stage);

        if let Err(err) = self
            .wait_for_stage(ctx, &poller, names, Stage::Initialization, timeouts.initialization_stage)
            .await
        {
            let error = RunError::InitializationStage(err);
            return Err(self.fail(ctx, error, JobLogsRequest::None).await);
        }

        let init_job_name = names.init_job_name();
        ctx.emit(RunEventKind::WaitingForJob {
            job_name: &init_job_name,
            timeout: timeouts.init_job,
        });
        let init_res = JobWaiter::new(self.store, intervals.init_job)
            .wait_for_completion(&init_job_name, since, timeouts.init_job)
            .await;
        if let Err(err) = init_res {
            let error = RunError::InitJob(err);
            return Err(self
                .fail(ctx, error, JobLogsRequest::PerPod(&init_job_name))
                .await);
        }
        ctx.emit(RunEventKind::JobCompleted {
            job_name: &init_job_name,
        });

        let replica_jobs: Vec<_> = (0..request.parallelism as usize)
            .map(|index| names.runner_job_name(index))
            .collect();
        if let Err(err) = self
            .wait_for_stage(ctx, &poller, names, Stage::Created, timeouts.created_stage)
            .await
        {
            let error = RunError::CreatedStage(err);
            return Err(self
                .fail(ctx, error, JobLogsRequest::SinceStart(&replica_jobs))
                .await);
        }

        ctx.emit(RunEventKind::WaitingForRunJobs {
            parallelism: request.parallelism,
            timeout: timeouts.run_jobs,
        });
        let run_res = {
            let coordinator = RunJobsCoordinator::new(self.store, names, intervals.run_job);
            let mut on_log = |event: LogStreamEvent| ctx.emit_log_event(event);
            coordinator
                .wait_for_all(request.parallelism, since, timeouts.run_jobs, &mut on_log)
                .await
        };
        if let Err(err) = run_res {
            let error = RunError::RunJobs(err);
            return Err(self.fail(ctx, error, JobLogsRequest::None).await);
        }

        if request.parallelism > 1 {
            self.report_replica_logs(ctx, &replica_jobs).await;
        }

        Ok(RunSummary {
            parallelism: request.parallelism,
            duration: ctx.stopwatch.snapshot().duration,
        })
    }

    async fn wait_for_stage(
        &self,
        ctx: &mut RunContext<'_>,
        poller: &StagePoller<'_>,
        names: &RunNames,
        stage: Stage,
        timeout: Duration,
    ) -> Result<(), StageWaitError> {
        let resource_name = names.resource_name();
        ctx.emit(RunEventKind::WaitingForStage {
            resource_name,
            stage,
            timeout,
        });
        let observed = poller.wait_for_stage(resource_name, stage, timeout).await?;
        ctx.emit(RunEventKind::StageReached {
            resource_name,
            expected: stage,
            observed,
        });
        Ok(())
    }

    async fn fail(
        &self,
        ctx: &mut RunContext<'_>,
        error: RunError,
        jobs: JobLogsRequest<'_>,
    ) -> RunFailure {
        debug!("run failed, collecting diagnostics: {error}");
        let diagnostics = DiagnosticsCollector::new(self.store, &self.config.operator)
            .collect(ctx.stopwatch.start_time(), jobs)
            .await;
        ctx.emit(RunEventKind::DiagnosticsCollected {
            report: &diagnostics,
        });
        RunFailure { error, diagnostics }
    }

    async fn report_replica_logs(&self, ctx: &mut RunContext<'_>, replica_jobs: &[String]) {
        let collector = DiagnosticsCollector::new(self.store, &self.config.operator);
        let since = ctx.stopwatch.start_time();
        let all_logs = join_all(
            replica_jobs
                .iter()
                .map(|job_name| collector.job_logs_since(job_name, since)),
        )
        .await;

        for (job_name, logs) in replica_jobs.iter().zip(&all_logs) {
            ctx.emit(RunEventKind::ReplicaLogs {
                job_name,
                logs: logs.as_deref(),
            });
        }
    }

    fn cleanup(&self) -> CleanupCoordinator<'a> {
        let timeouts = &self.config.timeouts;
        CleanupCoordinator::new(
            self.store,
            timeouts.cleanup,
            timeouts.delete_confirm,
            self.config.poll_intervals.delete_confirm,
        )
    }
}

impl RunFailure {
    fn without_diagnostics(error: RunError) -> Self {
        Self {
            error,
            diagnostics: DiagnosticReport::default(),
        }
    }
}

struct RunContext<'cb> {
    stopwatch: StopwatchStart,
    callback: &'cb mut dyn FnMut(RunEvent<'_>),
}

impl RunContext<'_> {
    fn emit(&mut self, kind: RunEventKind<'_>) {
        let snapshot = self.stopwatch.snapshot();
        (self.callback)(RunEvent {
            timestamp: snapshot.now(),
            elapsed: snapshot.duration,
            kind,
        });
    }

    fn emit_log_event(&mut self, event: LogStreamEvent) {
        match event {
            LogStreamEvent::Started { job_name } => {
                self.emit(RunEventKind::LogStreamStarted {
                    job_name: &job_name,
                });
            }
            LogStreamEvent::Chunk(chunk) => self.emit(RunEventKind::LogChunk { chunk: &chunk }),
            LogStreamEvent::Failed(error) => {
                self.emit(RunEventKind::LogStreamFailed { error: &error });
            }
            LogStreamEvent::Ended => self.emit(RunEventKind::LogStreamFinished),
        }
    }
}
