// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, K6ExitCode,
    docs::write_docs,
    errors::Result,
    output::{OutputContext, OutputOpts, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use k6_runner::{
    config::{OrchestratorConfig, RunConfig},
    manifest::{RunnerSettings, ScriptSource},
    naming::{RunId, RunNames},
    orchestrator::{Orchestrator, RunReport, RunRequest},
    reporter::RunReporter,
    store::KubeStore,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Run k6 load tests on a Kubernetes cluster through the k6 operator.
///
/// This binary can be invoked as `kubectl k6` when it is on the PATH.
#[derive(Debug, Parser)]
#[command(version, bin_name = "kubectl-k6", styles = clap_styles::style())]
pub struct KubectlK6App {
    #[command(flatten)]
    output: OutputOpts,

    #[command(subcommand)]
    command: Command,
}

impl KubectlK6App {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        match self.command {
            Command::Run(opts) => opts.exec(output),
            Command::Docs(opts) => opts.exec(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a k6 script on the cluster
    ///
    /// The script is uploaded to a config map, and a `TestRun` for it is handed to the k6
    /// operator. Progress and the test's output are printed as the run goes on. Every object
    /// created for the run is deleted afterwards, whether the run passed or not.
    Run(RunOpts),

    /// Generate the markdown command-line reference
    Docs(DocsOpts),
}

#[derive(Debug, Args)]
struct DocsOpts {
    /// The directory to write the reference to
    #[arg(value_name = "DIR", default_value = "docs")]
    output_dir: Utf8PathBuf,
}

impl DocsOpts {
    fn exec(self) -> Result<i32> {
        let path = write_docs(&self.output_dir)?;
        info!("wrote command-line reference to {path}");
        Ok(K6ExitCode::OK)
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    /// The k6 script to run
    ///
    /// With --volume-claim, this is the path of the script inside the volume.
    #[arg(value_name = "SCRIPT")]
    script: Utf8PathBuf,

    /// The namespace the k6 operator watches [default: from config]
    #[arg(long, short = 'n', value_name = "NAMESPACE")]
    namespace: Option<String>,

    /// Arguments passed to `k6 run` [default: from config]
    #[arg(long, short = 'a', value_name = "ARGS", allow_hyphen_values = true)]
    arguments: Option<String>,

    /// Set an environment variable for the runners, overriding the config
    #[arg(
        long = "env",
        short = 'e',
        value_name = "KEY=VALUE",
        value_parser = parse_env_var
    )]
    env: Vec<(String, String)>,

    /// The number of runner replicas [default: from config]
    #[arg(
        long,
        short = 'p',
        value_name = "N",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    parallelism: Option<u32>,

    /// A custom runner image
    #[arg(long, short = 'i', value_name = "IMAGE")]
    image: Option<String>,

    /// The pull secret for a custom runner image; pass an empty string for none
    #[arg(long, short = 's', value_name = "SECRET")]
    image_pull_secret: Option<String>,

    /// Read the script from the volume claim named after the run instead of uploading it
    #[arg(long)]
    volume_claim: bool,

    /// Config file [default: kubectl-k6.toml in the current directory]
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// Path to a kubeconfig [default: inferred like kubectl]
    #[arg(long, value_name = "PATH")]
    kubeconfig: Option<Utf8PathBuf>,
}

impl RunOpts {
    fn exec(self, output: OutputContext) -> Result<i32> {
        let cwd = current_dir()?;
        let mut config = OrchestratorConfig::from_sources(self.config.as_deref(), &cwd)
            .map_err(ExpectedError::config_parse_error)?;
        if let Some(namespace) = &self.namespace {
            config.namespace.clone_from(namespace);
        }

        let parallelism = self.parallelism.unwrap_or(config.run.parallelism);
        let runner = self.runner_settings(&config.run);
        let script = self.script_source()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| ExpectedError::RuntimeBuildError { err })?;
        let report = runtime.block_on(async {
            let store = KubeStore::from_kubeconfig(self.kubeconfig.as_deref(), &config.namespace)
                .await
                .map_err(|err| ExpectedError::KubeClientError { err })?;

            let request = RunRequest {
                names: RunNames::new(RunId::new()),
                parallelism,
                script,
                runner,
            };
            debug!(
                "starting run {} in namespace `{}`",
                request.names.run_id(),
                store.namespace()
            );

            let mut reporter = RunReporter::new(std::io::stderr());
            if output
                .color
                .should_colorize(supports_color::Stream::Stderr)
            {
                reporter.colorize();
            }

            let report = Orchestrator::new(&store, &config)
                .run(&request, |event| {
                    if let Err(err) = reporter.write_event(&event) {
                        warn!("failed to write run event: {err}");
                    }
                })
                .await;
            Ok::<_, ExpectedError>(report)
        })?;

        exit_code(&report)
    }

    fn runner_settings(&self, defaults: &RunConfig) -> RunnerSettings {
        let mut env: BTreeMap<_, _> = defaults.env.clone();
        env.extend(self.env.iter().cloned());

        let image_pull_secret = match &self.image_pull_secret {
            Some(secret) if secret.is_empty() => None,
            Some(secret) => Some(secret.clone()),
            None => defaults.image_pull_secret.clone(),
        };

        RunnerSettings {
            arguments: self
                .arguments
                .clone()
                .unwrap_or_else(|| defaults.arguments.clone()),
            env,
            image: self.image.clone().or_else(|| defaults.image.clone()),
            image_pull_secret,
        }
    }

    fn script_source(&self) -> Result<ScriptSource> {
        if self.volume_claim {
            return Ok(ScriptSource::volume_claim(self.script.as_str()));
        }
        read_inline_script(&self.script)
    }
}

fn read_inline_script(path: &Utf8Path) -> Result<ScriptSource> {
    let contents = std::fs::read_to_string(path).map_err(|err| ExpectedError::ScriptReadError {
        path: path.to_owned(),
        err,
    })?;
    ScriptSource::inline(contents).map_err(|err| ExpectedError::ScriptTooLarge {
        path: path.to_owned(),
        err,
    })
}

fn exit_code(report: &RunReport) -> Result<i32> {
    match (&report.outcome, &report.cleanup) {
        (Ok(_), Ok(())) => Ok(K6ExitCode::OK),
        (Ok(_), Err(_)) => Err(ExpectedError::CleanupFailed),
        (Err(_), _) => Err(ExpectedError::RunFailed),
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|err| ExpectedError::CurrentDir { err })?;
    Utf8PathBuf::try_from(cwd).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
}

fn parse_env_var(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("`{input}` has an empty variable name")),
        Some((key, value)) => Ok((key.to_owned(), value.to_owned())),
        None => Err(format!("`{input}` is not of the form KEY=VALUE")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use k6_runner::errors::ScriptTooLarge;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> RunOpts {
        let app = KubectlK6App::try_parse_from(
            std::iter::once("kubectl-k6").chain(args.iter().copied()),
        )
        .unwrap();
        match app.command {
            Command::Run(opts) => opts,
            other => panic!("expected the run command, got {other:?}"),
        }
    }

    fn run_defaults() -> RunConfig {
        OrchestratorConfig::defaults().unwrap().run
    }

    #[test]
    fn cli_flags_override_config() {
        let opts = parse(&[
            "run",
            "script.js",
            "-e",
            "BASE_URL=https://staging.example.com",
            "-e",
            "VUS=10",
            "-a",
            "--vus 10 --duration 30s",
            "-i",
            "registry.example.com/k6:1.0",
        ]);
        let mut defaults = run_defaults();
        defaults.env.insert("VUS".to_owned(), "1".to_owned());
        defaults.env.insert("REGION".to_owned(), "eu".to_owned());

        let settings = opts.runner_settings(&defaults);
        assert_eq!(settings.arguments, "--vus 10 --duration 30s");
        assert_eq!(
            settings.env,
            BTreeMap::from([
                (
                    "BASE_URL".to_owned(),
                    "https://staging.example.com".to_owned()
                ),
                ("REGION".to_owned(), "eu".to_owned()),
                ("VUS".to_owned(), "10".to_owned()),
            ])
        );
        assert_eq!(settings.image.as_deref(), Some("registry.example.com/k6:1.0"));
        assert_eq!(settings.image_pull_secret.as_deref(), Some("ifm-jfrog"));
    }

    #[test]
    fn empty_pull_secret_clears_default() {
        let opts = parse(&["run", "script.js", "-s", ""]);
        let settings = opts.runner_settings(&run_defaults());
        assert_eq!(settings.image_pull_secret, None);
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let cases: [&[&str]; 4] = [
            &["kubectl-k6", "run", "script.js", "-p", "0"],
            &["kubectl-k6", "run", "script.js", "-e", "NO_EQUALS"],
            &["kubectl-k6", "run", "script.js", "-e", "=value"],
            &["kubectl-k6", "run"],
        ];
        for args in cases {
            assert!(
                KubectlK6App::try_parse_from(args).is_err(),
                "{args:?} is rejected"
            );
        }
    }

    #[test]
    fn docs_output_dir() {
        let app = KubectlK6App::try_parse_from(["kubectl-k6", "docs"]).unwrap();
        match app.command {
            Command::Docs(opts) => assert_eq!(opts.output_dir, "docs"),
            other => panic!("expected the docs command, got {other:?}"),
        }

        let app = KubectlK6App::try_parse_from(["kubectl-k6", "docs", "site/cli"]).unwrap();
        match app.command {
            Command::Docs(opts) => assert_eq!(opts.output_dir, "site/cli"),
            other => panic!("expected the docs command, got {other:?}"),
        }
    }

    #[test]
    fn scripts_are_read_inline() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("script.js");
        std::fs::write(&path, "export default function () {}").unwrap();
        let script = read_inline_script(&path).unwrap();
        assert_eq!(
            script,
            ScriptSource::Inline {
                contents: "export default function () {}".to_owned()
            }
        );

        let opts = parse(&["run", "tests/main.js", "--volume-claim"]);
        assert_eq!(
            opts.script_source().unwrap(),
            ScriptSource::volume_claim("tests/main.js")
        );
    }

    #[test]
    fn script_errors() {
        let dir = Utf8TempDir::new().unwrap();
        let missing = read_inline_script(&dir.path().join("missing.js")).unwrap_err();
        assert_eq!(missing.process_exit_code(), K6ExitCode::SCRIPT_ERROR);

        let path = dir.path().join("big.js");
        std::fs::write(&path, "x".repeat((1 << 20) + 1)).unwrap();
        match read_inline_script(&path).unwrap_err() {
            ExpectedError::ScriptTooLarge {
                err: ScriptTooLarge { size, .. },
                ..
            } => assert_eq!(size, (1 << 20) + 1),
            other => panic!("expected script too large, got {other:?}"),
        }
    }
}
