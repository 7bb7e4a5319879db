// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `kubectl-k6` failures.
///
/// `kubectl-k6` might also exit with other codes, for example when it panics.
pub enum K6ExitCode {}

impl K6ExitCode {
    /// The run passed and its objects were deleted.
    pub const OK: i32 = 0;

    /// An error was encountered before the run started: reading the configuration or
    /// connecting to the cluster.
    pub const SETUP_ERROR: i32 = 96;

    /// The run failed.
    pub const RUN_FAILED: i32 = 100;

    /// The run passed, but some of its objects could not be deleted.
    pub const CLEANUP_FAILED: i32 = 101;

    /// The script could not be read, or is too large to upload.
    pub const SCRIPT_ERROR: i32 = 104;

    /// Writing generated output, such as the command-line reference, failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
