// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{OperatorConfig, PollIntervalsConfig, RunConfig, TimeoutsConfig};
use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use config::{
    Case, Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState,
};
use itertools::Itertools;
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};
use tracing::warn;

/// Configuration for a run, read from the config file and the environment.
///
/// The configuration is passed explicitly to every component that needs it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrchestratorConfig {
    /// The namespace the k6 operator watches.
    pub namespace: String,
    /// Phase timeouts.
    pub timeouts: TimeoutsConfig,
    /// Polling intervals.
    pub poll_intervals: PollIntervalsConfig,
    /// Where operator logs are read from.
    pub operator: OperatorConfig,
    /// Defaults for the run.
    pub run: RunConfig,
}

impl OrchestratorConfig {
    /// The default configuration.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the config file looked for in the current directory.
    pub const CONFIG_FILE_NAME: &'static str = "kubectl-k6.toml";

    /// The longest accepted timeout or polling interval.
    pub const MAX_DURATION: Duration = Duration::from_secs(30 * 86400);

    /// The prefix for environment variables.
    pub const ENV_PREFIX: &'static str = "K6K8S";

    /// Reads the configuration from the defaults, a config file and the process environment.
    ///
    /// If `config_file` is `None`, `kubectl-k6.toml` in `cwd` is used if it exists.
    pub fn from_sources(
        config_file: Option<&Utf8Path>,
        cwd: &Utf8Path,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(config_file, cwd, None)
    }

    /// Returns the built-in defaults, ignoring any config file or environment.
    pub fn defaults() -> Result<Self, ConfigParseError> {
        let (config, _) = Self::build_and_deserialize_config(&Self::make_default_config())
            .map_err(|kind| ConfigParseError::new(None, kind))?;
        Ok(config)
    }

    fn from_sources_impl(
        config_file: Option<&Utf8Path>,
        cwd: &Utf8Path,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source): (Utf8PathBuf, _) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let file = cwd.join(Self::CONFIG_FILE_NAME);
                let source = File::new(file.as_str(), FileFormat::Toml).required(false);
                (file, source)
            }
        };

        let environment = Environment::with_prefix(Self::ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .convert_case(Case::Kebab)
            .try_parsing(true)
            .source(env);

        let builder = Self::make_default_config()
            .add_source(source)
            .add_source(environment);
        let (config, ignored) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(Some(config_file.clone()), kind))?;

        if !ignored.is_empty() {
            warn!(
                "ignoring unknown configuration keys (from {config_file} or the environment): {}",
                ignored.iter().join(", ")
            );
        }

        config
            .validate()
            .map_err(|kind| ConfigParseError::new(Some(config_file), kind))?;
        Ok(config)
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(Self, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: Self = serde_path_to_error::deserialize(ignored_de).map_err(|error| {
            // serde_path_to_error already reports the key, so drop it from the config error.
            let path = error.path().clone();
            let error = match error.into_inner() {
                ConfigError::At { error, .. } => *error,
                other => other,
            };
            ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                path, error,
            )))
        })?;

        Ok((config, ignored))
    }

    fn validate(&self) -> Result<(), ConfigParseErrorKind> {
        if self.namespace.is_empty() {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "namespace",
                reason: "must not be empty".to_owned(),
            });
        }
        if self.run.parallelism == 0 {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "run.parallelism",
                reason: "must be at least 1".to_owned(),
            });
        }

        let durations = [
            ("timeouts.initialization-stage", self.timeouts.initialization_stage),
            ("timeouts.init-job", self.timeouts.init_job),
            ("timeouts.created-stage", self.timeouts.created_stage),
            ("timeouts.run-jobs", self.timeouts.run_jobs),
            ("timeouts.cleanup", self.timeouts.cleanup),
            ("timeouts.delete-confirm", self.timeouts.delete_confirm),
            ("poll-intervals.stage", self.poll_intervals.stage),
            ("poll-intervals.init-job", self.poll_intervals.init_job),
            ("poll-intervals.run-job", self.poll_intervals.run_job),
            ("poll-intervals.delete-confirm", self.poll_intervals.delete_confirm),
        ];
        for (key, value) in durations {
            if value == Duration::ZERO {
                return Err(ConfigParseErrorKind::InvalidValue {
                    key,
                    reason: "must be non-zero".to_owned(),
                });
            }
            if value > Self::MAX_DURATION {
                return Err(ConfigParseErrorKind::InvalidValue {
                    key,
                    reason: format!(
                        "must be at most {}",
                        humantime::format_duration(Self::MAX_DURATION)
                    ),
                });
            }
        }
        Ok(())
    }
}
