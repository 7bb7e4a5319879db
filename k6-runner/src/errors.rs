// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by kubectl-k6.

use crate::{
    stage::{JobCounters, Stage},
    store::ObjectKind,
};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error::Error, fmt, time::Duration};
use thiserror::Error;

/// A boxed error from an underlying client library.
pub type BoxedError = Box<dyn Error + Send + Sync + 'static>;

/// An error returned by a [`ResourceStore`](crate::store::ResourceStore).
///
/// Store errors are, for the most part, treated as transient: the waiters retry them until their
/// deadline elapses.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The object does not exist.
    #[error("{kind} `{name}` not found")]
    NotFound {
        /// The kind of object.
        kind: ObjectKind,
        /// The name of the object.
        name: String,
    },

    /// The object exists, but the operator hasn't written a status for it yet.
    #[error("{kind} `{name}` has no status yet")]
    StatusNotReported {
        /// The kind of object.
        kind: ObjectKind,
        /// The name of the object.
        name: String,
    },

    /// No pods are backing the job.
    #[error("job `{job_name}` has no pods")]
    NoPods {
        /// The name of the job.
        job_name: String,
    },

    /// No pods match a label selector.
    #[error("no pods match `{label_selector}`")]
    NoMatchingPods {
        /// The label selector.
        label_selector: String,
    },

    /// A store read was abandoned at a deadline.
    #[error("timed out trying to {operation}")]
    DeadlineElapsed {
        /// A description of the request.
        operation: String,
    },

    /// A field read from the store could not be interpreted.
    #[error("failed to decode {what}")]
    Decode {
        /// A description of what was being decoded.
        what: String,
        /// The underlying error.
        #[source]
        err: BoxedError,
    },

    /// A request to the store failed.
    #[error("failed to {operation}")]
    Request {
        /// A description of the request.
        operation: String,
        /// The underlying error.
        #[source]
        err: BoxedError,
    },
}

impl StoreError {
    pub(crate) fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn request(operation: impl Into<String>, err: impl Into<BoxedError>) -> Self {
        Self::Request {
            operation: operation.into(),
            err: err.into(),
        }
    }

    pub(crate) fn decode(what: impl Into<String>, err: impl Into<BoxedError>) -> Self {
        Self::Decode {
            what: what.into(),
            err: err.into(),
        }
    }

    /// Returns true if this error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// An unrecognized value in a `TestRun`'s `status.stage` field.
#[derive(Clone, Debug, Error)]
#[error("unknown test run stage `{input}`")]
pub struct UnknownStageError {
    input: String,
}

impl UnknownStageError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the value that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// An error returned while waiting for a `TestRun` to reach a stage.
#[derive(Debug, Error)]
pub enum StageWaitError {
    /// The operator reported the error stage.
    #[error("test run `{resource_name}` entered the error stage")]
    ErrorStage {
        /// The name of the `TestRun`.
        resource_name: String,
    },

    /// The deadline elapsed before the expected stage was reached.
    #[error(
        "timed out after {} waiting for test run `{resource_name}` to reach stage `{expected}` \
         (last observed: {})",
        fmt_duration(.timeout),
        DisplayLastObserved(.last_observed.as_ref()),
    )]
    Timeout {
        /// The name of the `TestRun`.
        resource_name: String,
        /// The stage that was being waited for.
        expected: Stage,
        /// The timeout for the wait.
        timeout: Duration,
        /// The last stage read from the store, if any.
        last_observed: Option<Stage>,
        /// The last read error, if the most recent read failed.
        #[source]
        last_error: Option<StoreError>,
    },
}

/// Logs captured for a failed job, or the reason they couldn't be captured.
#[derive(Debug)]
pub enum JobFailureLogs {
    /// Logs since the start of the run.
    Captured(String),
    /// Retrieving the logs failed.
    Unavailable(StoreError),
}

/// An error returned while waiting for a job to complete.
#[derive(Debug, Error)]
pub enum JobWaitError {
    /// The job's counters report a failure.
    #[error("job `{job_name}` failed, {}", DisplayFailureLogs(.logs))]
    Failed {
        /// The name of the job.
        job_name: String,
        /// The job's logs.
        logs: JobFailureLogs,
    },

    /// The deadline elapsed before the job completed.
    #[error(
        "timed out after {} waiting for job `{job_name}` to complete (last observed: {})",
        fmt_duration(.timeout),
        DisplayLastObserved(.last_counters.as_ref()),
    )]
    Timeout {
        /// The name of the job.
        job_name: String,
        /// The timeout for the wait.
        timeout: Duration,
        /// The last counters read from the store, if any.
        last_counters: Option<JobCounters>,
        /// The last read error, if the most recent read failed.
        #[source]
        last_error: Option<StoreError>,
    },
}

impl JobWaitError {
    /// Returns the name of the job this error is for.
    pub fn job_name(&self) -> &str {
        match self {
            Self::Failed { job_name, .. } | Self::Timeout { job_name, .. } => job_name,
        }
    }
}

/// A failure of one run-job replica.
#[derive(Debug, Error)]
#[error("replica {}: {}", .index + 1, DisplayErrorChain::new(.error))]
pub struct ReplicaFailure {
    /// The zero-based replica index.
    pub index: usize,
    /// The error for this replica.
    pub error: JobWaitError,
}

/// An error returned when one or more run jobs failed.
///
/// Every failed replica is present, ordered by replica index.
#[derive(Debug, Error)]
#[error("{} of {parallelism} run jobs failed:\n{}", .failures.len(), Bulleted(.failures))]
pub struct RunJobsError {
    parallelism: usize,
    failures: Vec<ReplicaFailure>,
}

impl RunJobsError {
    /// Returns an error if `failures` is non-empty.
    pub(crate) fn new(parallelism: usize, failures: Vec<ReplicaFailure>) -> Option<Self> {
        (!failures.is_empty()).then_some(Self {
            parallelism,
            failures,
        })
    }

    /// Returns the number of replicas that were waited on.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Returns the failed replicas.
    pub fn failures(&self) -> &[ReplicaFailure] {
        &self.failures
    }
}

/// An error that occurred while deleting one object during cleanup.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// The delete request failed.
    #[error("failed to delete {kind} `{name}`")]
    Request {
        /// The kind of object.
        kind: ObjectKind,
        /// The name of the object.
        name: String,
        /// The underlying error.
        #[source]
        err: StoreError,
    },

    /// The delete was accepted, but the object was still present after the confirmation timeout.
    #[error(
        "{kind} `{name}` was still present {} after being deleted",
        fmt_duration(.timeout)
    )]
    ConfirmTimeout {
        /// The kind of object.
        kind: ObjectKind,
        /// The name of the object.
        name: String,
        /// The confirmation timeout.
        timeout: Duration,
        /// The last read error, if the most recent read failed.
        #[source]
        last_error: Option<StoreError>,
    },

    /// The overall cleanup deadline elapsed while the delete request was in flight.
    #[error("cleanup deadline elapsed while deleting {kind} `{name}`")]
    DeadlineElapsed {
        /// The kind of object.
        kind: ObjectKind,
        /// The name of the object.
        name: String,
    },
}

impl DeleteError {
    /// Returns the name of the object this error is for.
    pub fn name(&self) -> &str {
        match self {
            Self::Request { name, .. }
            | Self::ConfirmTimeout { name, .. }
            | Self::DeadlineElapsed { name, .. } => name,
        }
    }
}

/// An error returned by cleanup: one entry per object that could not be deleted.
pub type CleanupError = ErrorList<DeleteError>;

/// The error that ended a run attempt.
#[derive(Debug, Error)]
pub enum RunError {
    /// Deleting leftovers from a previous attempt failed.
    #[error("pre-run cleanup failed")]
    PreCleanup(#[source] CleanupError),

    /// The script config map could not be created.
    #[error("failed to upload script config map `{name}`")]
    UploadScript {
        /// The name of the config map.
        name: String,
        /// The underlying error.
        #[source]
        err: StoreError,
    },

    /// The `TestRun` could not be created.
    #[error("failed to create test run `{name}`")]
    CreateTestRun {
        /// The name of the `TestRun`.
        name: String,
        /// The underlying error.
        #[source]
        err: StoreError,
    },

    /// The initialization stage was not reached.
    #[error("error in initialization phase")]
    InitializationStage(#[source] StageWaitError),

    /// The initializer job failed or did not complete.
    #[error("initializer job did not complete successfully")]
    InitJob(#[source] JobWaitError),

    /// The created stage was not reached.
    #[error("error in creation phase")]
    CreatedStage(#[source] StageWaitError),

    /// One or more run jobs failed or did not complete.
    #[error("run jobs did not complete successfully")]
    RunJobs(#[source] RunJobsError),
}

/// An inline script that is too large to store in a config map.
#[derive(Clone, Debug, Error)]
#[error("the script is too large for a config map: {size} bytes (max {max} bytes)")]
pub struct ScriptTooLarge {
    /// The size of the script in bytes.
    pub size: usize,
    /// The maximum size in bytes.
    pub max: usize,
}

/// An error that occurred while building the Kubernetes client.
#[derive(Debug, Error)]
pub enum KubeClientError {
    /// The kubeconfig file could not be read.
    #[error("failed to read kubeconfig at `{path}`")]
    ReadKubeconfig {
        /// The path to the kubeconfig.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: kube::config::KubeconfigError,
    },

    /// The client configuration could not be inferred or loaded.
    #[error("failed to load Kubernetes client configuration")]
    Config(#[source] BoxedError),

    /// The client could not be constructed from its configuration.
    #[error("failed to create Kubernetes client")]
    Client(#[source] kube::Error),
}

/// An error that occurred while reading the configuration.
#[derive(Debug, Error)]
#[error(
    "failed to parse kubectl-k6 config{}",
    .config_file.as_ref().map(|file| format!(" at `{file}`")).unwrap_or_default()
)]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Option<Utf8PathBuf>,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: Option<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self { config_file, kind }
    }

    /// Returns the config file that was being read, if one was specified or found.
    pub fn config_file(&self) -> Option<&Utf8PathBuf> {
        self.config_file.as_ref()
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// The config sources could not be merged.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// The merged config could not be deserialized.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A value was syntactically valid but not allowed.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// The config key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// A non-empty list of errors of the same kind.
///
/// The display implementation enumerates every error, along with its chain of causes.
#[derive(Debug)]
pub struct ErrorList<T> {
    description: &'static str,
    inner: Vec<T>,
}

impl<T: Error> ErrorList<T> {
    /// Returns `None` if `errors` is empty.
    pub(crate) fn new(description: &'static str, errors: Vec<T>) -> Option<Self> {
        (!errors.is_empty()).then_some(Self {
            description,
            inner: errors,
        })
    }

    /// Returns a short description of what failed.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Returns the errors in this list.
    pub fn errors(&self) -> &[T] {
        &self.inner
    }

    /// Returns the number of errors. This is always at least 1.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Always false: an error list is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl<T: Error> fmt::Display for ErrorList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.inner.as_slice() {
            write!(f, "{}: {}", self.description, DisplayErrorChain::new(single))
        } else {
            write!(
                f,
                "{} errors occurred {}:\n{}",
                self.inner.len(),
                self.description,
                Bulleted(&self.inner),
            )
        }
    }
}

impl<T: Error> Error for ErrorList<T> {}

/// Displays an error followed by each error in its source chain.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new display wrapper.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        let mut source = self.error.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }
        Ok(())
    }
}

struct Bulleted<'a, T>(&'a [T]);

impl<T: Error> fmt::Display for Bulleted<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let text = DisplayErrorChain::new(error).to_string();
            for (j, line) in text.lines().enumerate() {
                if j == 0 {
                    write!(f, "  * {line}")?;
                } else {
                    write!(f, "\n    {line}")?;
                }
            }
        }
        Ok(())
    }
}

fn fmt_duration(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

struct DisplayLastObserved<'a, T>(Option<&'a T>);

impl<T: fmt::Display> fmt::Display for DisplayLastObserved<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value}"),
            None => f.write_str("nothing"),
        }
    }
}

struct DisplayFailureLogs<'a>(&'a JobFailureLogs);

impl fmt::Display for DisplayFailureLogs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            JobFailureLogs::Captured(logs) if logs.is_empty() => f.write_str("no logs were produced"),
            JobFailureLogs::Captured(logs) => write!(f, "logs:\n{}", logs.trim_end()),
            JobFailureLogs::Unavailable(err) => write!(
                f,
                "could not retrieve logs: {}",
                DisplayErrorChain::new(err)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn failed(job_name: &str, logs: &str) -> JobWaitError {
        JobWaitError::Failed {
            job_name: job_name.to_owned(),
            logs: JobFailureLogs::Captured(logs.to_owned()),
        }
    }

    #[test]
    fn run_jobs_error_lists_every_failure() {
        let error = RunJobsError::new(
            3,
            vec![
                ReplicaFailure {
                    index: 0,
                    error: failed("run-x-1", "line 1\nline 2\n"),
                },
                ReplicaFailure {
                    index: 2,
                    error: JobWaitError::Failed {
                        job_name: "run-x-3".to_owned(),
                        logs: JobFailureLogs::Unavailable(StoreError::NoPods {
                            job_name: "run-x-3".to_owned(),
                        }),
                    },
                },
            ],
        )
        .expect("failures are non-empty");

        assert_eq!(
            error.to_string(),
            indoc! {"
                2 of 3 run jobs failed:
                  * replica 1: job `run-x-1` failed, logs:
                    line 1
                    line 2
                  * replica 3: job `run-x-3` failed, could not retrieve logs: job `run-x-3` has no pods"
            }
        );
    }

    #[test]
    fn empty_lists_are_not_errors() {
        assert!(RunJobsError::new(2, Vec::new()).is_none());
        assert!(ErrorList::<DeleteError>::new("while cleaning up", Vec::new()).is_none());
    }

    #[test]
    fn error_list_display() {
        let single = ErrorList::new(
            "while cleaning up",
            vec![DeleteError::Request {
                kind: ObjectKind::TestRun,
                name: "run-x".to_owned(),
                err: StoreError::request("reach the API server", "connection reset"),
            }],
        )
        .unwrap();
        assert_eq!(
            single.to_string(),
            indoc! {"
                while cleaning up: failed to delete test run `run-x`
                  caused by: failed to reach the API server
                  caused by: connection reset"
            }
        );

        let multiple = ErrorList::new(
            "while cleaning up",
            vec![
                DeleteError::DeadlineElapsed {
                    kind: ObjectKind::ConfigMap,
                    name: "x".to_owned(),
                },
                DeleteError::ConfirmTimeout {
                    kind: ObjectKind::TestRun,
                    name: "run-x".to_owned(),
                    timeout: Duration::from_secs(5),
                    last_error: None,
                },
            ],
        )
        .unwrap();
        assert_eq!(
            multiple.to_string(),
            indoc! {"
                2 errors occurred while cleaning up:
                  * cleanup deadline elapsed while deleting config map `x`
                  * test run `run-x` was still present 5s after being deleted"
            }
        );
    }
}
