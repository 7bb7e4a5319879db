// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{K6ExitCode, StderrStyles, output::NO_HEADING_TARGET};
use camino::Utf8PathBuf;
use k6_runner::errors::{ConfigParseError, KubeClientError, ScriptTooLarge};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are mostly placeholders: errors are expected to be printed with
// display_to_stderr, which colorizes them.

/// An error that `kubectl-k6` knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDir {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: camino::FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[source]
        err: ConfigParseError,
    },
    #[error("failed to read script")]
    ScriptReadError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("script too large")]
    ScriptTooLarge {
        path: Utf8PathBuf,
        #[source]
        err: ScriptTooLarge,
    },
    #[error("failed to create Kubernetes client")]
    KubeClientError {
        #[source]
        err: KubeClientError,
    },
    #[error("failed to create the async runtime")]
    RuntimeBuildError {
        #[source]
        err: std::io::Error,
    },
    #[error("failed to create docs directory")]
    DocsCreateDir {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to write docs")]
    DocsWrite {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    RunFailed,
    #[error("cleanup failed")]
    CleanupFailed,
}

impl ExpectedError {
    pub(crate) fn config_parse_error(err: ConfigParseError) -> Self {
        Self::ConfigParseError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDir { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::KubeClientError { .. }
            | Self::RuntimeBuildError { .. } => K6ExitCode::SETUP_ERROR,
            Self::ScriptReadError { .. } | Self::ScriptTooLarge { .. } => K6ExitCode::SCRIPT_ERROR,
            Self::DocsCreateDir { .. } | Self::DocsWrite { .. } => K6ExitCode::WRITE_OUTPUT_ERROR,
            Self::RunFailed => K6ExitCode::RUN_FAILED,
            Self::CleanupFailed => K6ExitCode::CLEANUP_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDir { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    err.as_path().display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!("{err}");
                err.source()
            }
            Self::ScriptReadError { path, err } => {
                error!("failed to read script `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::ScriptTooLarge { path, err } => {
                error!("cannot upload script `{}`: {err}", path.style(styles.bold));
                None
            }
            Self::KubeClientError { err } => {
                error!("{err}");
                err.source()
            }
            Self::RuntimeBuildError { err } => {
                error!("failed to create the async runtime");
                Some(err as &dyn Error)
            }
            Self::DocsCreateDir { path, err } => {
                error!("failed to create directory `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::DocsWrite { path, err } => {
                error!("failed to write `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::RunFailed => {
                // The run reporter has already printed the reason.
                error!("test run failed");
                None
            }
            Self::CleanupFailed => {
                error!("test run passed, but its objects could not all be deleted");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ExpectedError::RunFailed, 100 ; "run failed")]
    #[test_case(ExpectedError::CleanupFailed, 101 ; "cleanup failed")]
    #[test_case(
        ExpectedError::ScriptTooLarge {
            path: "big.js".into(),
            err: ScriptTooLarge { size: 2 << 20, max: 1 << 20 },
        },
        104
        ; "script too large"
    )]
    #[test_case(
        ExpectedError::RuntimeBuildError { err: std::io::Error::other("no threads") },
        96
        ; "setup error"
    )]
    #[test_case(
        ExpectedError::DocsWrite {
            path: "docs/kubectl-k6.md".into(),
            err: std::io::Error::other("disk full"),
        },
        110
        ; "docs write error"
    )]
    fn exit_codes(error: ExpectedError, expected: i32) {
        assert_eq!(error.process_exit_code(), expected);
    }
}
