// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The objects kubectl-k6 writes to the cluster.
//!
//! The shape of [`TestRunManifest`] is a contract with the k6 operator: field names and nesting
//! must match the operator's `TestRun` CRD exactly.

use crate::{errors::ScriptTooLarge, naming::RunNames};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The API version of the `TestRun` custom resource.
pub const TEST_RUN_API_VERSION: &str = "k6.io/v1alpha1";

/// The kind of the `TestRun` custom resource.
pub const TEST_RUN_KIND: &str = "TestRun";

/// The key under which an inline script is stored in its config map.
pub const SCRIPT_CONFIG_MAP_KEY: &str = "out.js";

/// Config maps are limited to 1 MiB of data.
pub const MAX_INLINE_SCRIPT_SIZE: usize = 1024 * 1024;

/// How the script reaches the runner pods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptSource {
    /// The script is uploaded in a config map named after the run.
    Inline {
        /// The bundled script.
        contents: String,
    },
    /// The script already lives on a volume claim named after the run.
    VolumeClaim {
        /// The path of the script inside the volume.
        file: String,
    },
}

impl ScriptSource {
    /// Creates an inline source, checking that it fits in a config map.
    pub fn inline(contents: impl Into<String>) -> Result<Self, ScriptTooLarge> {
        let contents = contents.into();
        if contents.len() > MAX_INLINE_SCRIPT_SIZE {
            return Err(ScriptTooLarge {
                size: contents.len(),
                max: MAX_INLINE_SCRIPT_SIZE,
            });
        }
        Ok(Self::Inline { contents })
    }

    /// Creates a volume claim source.
    pub fn volume_claim(file: impl Into<String>) -> Self {
        Self::VolumeClaim { file: file.into() }
    }

    /// Returns the config map to upload for this source, if any.
    pub fn config_map(&self, names: &RunNames) -> Option<ScriptConfigMap> {
        match self {
            Self::Inline { contents } => Some(ScriptConfigMap {
                name: names.config_map_name().to_owned(),
                data: BTreeMap::from([(SCRIPT_CONFIG_MAP_KEY.to_owned(), contents.clone())]),
            }),
            Self::VolumeClaim { .. } => None,
        }
    }

    fn script_ref(&self, names: &RunNames) -> ScriptRef {
        let name = names.config_map_name().to_owned();
        match self {
            Self::Inline { .. } => ScriptRef::ConfigMap(ScriptFile {
                name,
                file: SCRIPT_CONFIG_MAP_KEY.to_owned(),
            }),
            Self::VolumeClaim { file } => ScriptRef::VolumeClaim(ScriptFile {
                name,
                file: file.clone(),
            }),
        }
    }
}

/// The config map holding an inline script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptConfigMap {
    /// The name of the config map.
    pub name: String,
    /// The config map's data.
    pub data: BTreeMap<String, String>,
}

/// Per-run runner settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Arguments passed to `k6 run`.
    pub arguments: String,
    /// Environment variables for the runner.
    ///
    /// Names are upper-cased in the manifest, and `-` is replaced with `_`: keys set through the
    /// environment arrive in kebab case.
    pub env: BTreeMap<String, String>,
    /// A custom runner image.
    pub image: Option<String>,
    /// The pull secret for a custom runner image.
    pub image_pull_secret: Option<String>,
}

/// The `TestRun` custom resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunManifest {
    /// Always [`TEST_RUN_API_VERSION`].
    pub api_version: String,
    /// Always [`TEST_RUN_KIND`].
    pub kind: String,
    /// Object metadata.
    pub metadata: TestRunMetadata,
    /// The desired run.
    pub spec: TestRunSpec,
}

impl TestRunManifest {
    /// Builds the manifest for a run.
    pub fn new(
        names: &RunNames,
        parallelism: u32,
        script: &ScriptSource,
        settings: &RunnerSettings,
    ) -> Self {
        // Normalized names can collide, in which case the last one in sorted order wins.
        let env: BTreeMap<String, String> = settings
            .env
            .iter()
            .map(|(name, value)| (env_var_name(name), value.clone()))
            .collect();
        let env = env
            .into_iter()
            .map(|(name, value)| EnvVar { name, value })
            .collect();

        let image_pull_secrets = match (&settings.image, &settings.image_pull_secret) {
            (Some(_), Some(secret)) => vec![LocalObjectReference {
                name: secret.clone(),
            }],
            _ => Vec::new(),
        };

        Self {
            api_version: TEST_RUN_API_VERSION.to_owned(),
            kind: TEST_RUN_KIND.to_owned(),
            metadata: TestRunMetadata {
                name: names.resource_name().to_owned(),
            },
            spec: TestRunSpec {
                parallelism,
                arguments: settings.arguments.clone(),
                script: script.script_ref(names),
                runner: RunnerSpec {
                    env,
                    image: settings.image.clone(),
                    image_pull_secrets,
                },
            },
        }
    }

    /// Returns the name of the resource.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns the normalized names of the runner's environment variables, in order.
    pub fn env_names(&self) -> Vec<&str> {
        self.spec
            .runner
            .env
            .iter()
            .map(|var| var.name.as_str())
            .collect()
    }
}

fn env_var_name(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}

/// `TestRun` metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunMetadata {
    /// The resource name.
    pub name: String,
}

/// `TestRun` spec.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunSpec {
    /// How many run jobs to create.
    pub parallelism: u32,
    /// Arguments passed to `k6 run`.
    pub arguments: String,
    /// Where the script comes from.
    pub script: ScriptRef,
    /// Runner pod settings.
    pub runner: RunnerSpec,
}

/// Where the operator finds the script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptRef {
    /// A key in a config map.
    ConfigMap(ScriptFile),
    /// A file on a volume claim.
    VolumeClaim(ScriptFile),
}

/// A named object and a file within it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFile {
    /// The config map or volume claim name.
    pub name: String,
    /// The file within it.
    pub file: String,
}

/// Runner pod settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    image_pull_secrets: Vec<LocalObjectReference>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct EnvVar {
    name: String,
    value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct LocalObjectReference {
    name: String,
}

/// The part of a `TestRun`'s status that kubectl-k6 reads.
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct TestRunStatus {
    #[serde(default)]
    pub(crate) stage: Option<String>,
}
