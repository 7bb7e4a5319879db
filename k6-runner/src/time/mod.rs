// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod poll;
mod stopwatch;

pub(crate) use poll::*;
pub(crate) use stopwatch::*;
