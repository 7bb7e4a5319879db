// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Names of the objects that make up one run.
//!
//! Every name is a pure function of the [`RunId`]. The operator derives the job names the same
//! way, so these must not change.

use rand::distr::{Alphanumeric, SampleString};
use std::fmt;

/// A random identifier for one run attempt.
///
/// Run IDs are 20 lowercase alphanumeric characters, which keeps every derived name a valid
/// Kubernetes object name and makes collisions between concurrent runs vanishingly unlikely.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    /// The number of characters in a generated run ID.
    pub const LEN: usize = 20;

    /// Generates a new random run ID.
    pub fn new() -> Self {
        let mut id = Alphanumeric.sample_string(&mut rand::rng(), Self::LEN);
        id.make_ascii_lowercase();
        Self(id)
    }

    /// Uses an existing string as the run ID.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the run ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The derived names for a single run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunNames {
    run_id: RunId,
    resource_name: String,
}

impl RunNames {
    /// Creates the names for the given run ID.
    pub fn new(run_id: RunId) -> Self {
        let resource_name = format!("run-{run_id}");
        Self {
            run_id,
            resource_name,
        }
    }

    /// Returns the run ID.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The name of the `TestRun` custom resource.
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// The name of the config map holding the script.
    ///
    /// This is also the name of the volume claim when the script is delivered through a volume.
    pub fn config_map_name(&self) -> &str {
        self.run_id.as_str()
    }

    /// The name of the initializer job created by the operator.
    pub fn init_job_name(&self) -> String {
        format!("{}-initializer", self.resource_name)
    }

    /// The name of the run job for the replica at `index` (zero-based).
    pub fn runner_job_name(&self, index: usize) -> String {
        format!("{}-{}", self.resource_name, index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names() {
        let names = RunNames::new(RunId::from_string("abc123"));
        assert_eq!(names.resource_name(), "run-abc123");
        assert_eq!(names.config_map_name(), "abc123");
        assert_eq!(names.init_job_name(), "run-abc123-initializer");
        assert_eq!(names.runner_job_name(0), "run-abc123-1");
        assert_eq!(names.runner_job_name(9), "run-abc123-10");
    }

    #[test]
    fn generated_ids_are_valid_object_names() {
        let id = RunId::new();
        assert_eq!(id.as_str().len(), RunId::LEN);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()),
            "run ID {id} is lowercase alphanumeric"
        );
        assert_ne!(RunId::new(), RunId::new());
    }
}
