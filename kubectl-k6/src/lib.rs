// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run k6 load tests on a Kubernetes cluster through the k6 operator.
//!
//! The binary can be invoked directly as `kubectl-k6`, or as `kubectl k6` when it is on the
//! `PATH`.

#![warn(missing_docs)]

mod dispatch;
mod docs;
mod errors;
mod exit_codes;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
pub use exit_codes::K6ExitCode;
pub use output::{OutputContext, StderrStyles};
