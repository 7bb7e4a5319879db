// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable rendering of [`RunEvent`]s.

use super::events::{RunEvent, RunEventKind};
use crate::{
    diagnostics::{DiagnosticReport, JobLogs},
    errors::DisplayErrorChain,
    orchestrator::RunReport,
    store::PodLogs,
};
use itertools::Itertools;
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

/// Writes run events as text.
pub struct RunReporter<W> {
    writer: W,
    styles: Box<Styles>,
}

impl<W: Write> RunReporter<W> {
    /// Creates a new reporter that writes to `writer`, without colors.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            styles: Box::default(),
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer
    }

    /// Writes an event.
    pub fn write_event(&mut self, event: &RunEvent<'_>) -> io::Result<()> {
        self.write_event_impl(event)?;
        self.writer.flush()
    }

    fn write_event_impl(&mut self, event: &RunEvent<'_>) -> io::Result<()> {
        let styles = &*self.styles;
        let writer = &mut self.writer;

        match &event.kind {
            RunEventKind::PreCleanupStarted { names } => {
                writeln!(writer, "------------")?;
                write!(writer, "{:>12} ", "k6 run".style(styles.pass))?;
                writeln!(
                    writer,
                    "ID {}, removing leftover objects",
                    names.run_id().style(styles.count)
                )?;
            }
            RunEventKind::ScriptUploading { config_map_name } => {
                write!(writer, "{:>12} ", "Uploading".style(styles.pass))?;
                writeln!(
                    writer,
                    "script to config map {}",
                    config_map_name.style(styles.name)
                )?;
            }
            RunEventKind::TestRunCreating {
                resource_name,
                parallelism,
                arguments,
                env_names,
            } => {
                write!(writer, "{:>12} ", "Creating".style(styles.pass))?;
                writeln!(
                    writer,
                    "test run {} with {} {}",
                    resource_name.style(styles.name),
                    parallelism.style(styles.count),
                    replicas_str(*parallelism),
                )?;
                if !arguments.is_empty() {
                    writeln!(writer, "{:>12} k6 arguments: {arguments}", "")?;
                }
                if !env_names.is_empty() {
                    writeln!(
                        writer,
                        "{:>12} environment: {}",
                        "",
                        env_names.iter().map(|name| name.style(styles.name)).join(", ")
                    )?;
                }
            }
            RunEventKind::WaitingForStage {
                resource_name,
                stage,
                timeout,
            } => {
                write!(writer, "{:>12} ", "Waiting".style(styles.pass))?;
                writeln!(
                    writer,
                    "for {} to reach stage {} (timeout {})",
                    resource_name.style(styles.name),
                    stage.style(styles.count),
                    humantime::format_duration(*timeout),
                )?;
            }
            RunEventKind::StageReached {
                resource_name,
                observed,
                ..
            } => {
                write!(writer, "{:>12} ", "Stage".style(styles.pass))?;
                writeln!(
                    writer,
                    "{} is at {}",
                    resource_name.style(styles.name),
                    observed.style(styles.count),
                )?;
            }
            RunEventKind::WaitingForJob { job_name, timeout } => {
                write!(writer, "{:>12} ", "Waiting".style(styles.pass))?;
                writeln!(
                    writer,
                    "for job {} (timeout {})",
                    job_name.style(styles.name),
                    humantime::format_duration(*timeout),
                )?;
            }
            RunEventKind::JobCompleted { job_name } => {
                write!(writer, "{:>12} ", "Completed".style(styles.pass))?;
                writeln!(writer, "job {}", job_name.style(styles.name))?;
            }
            RunEventKind::WaitingForRunJobs {
                parallelism,
                timeout,
            } => {
                write!(writer, "{:>12} ", "Running".style(styles.pass))?;
                writeln!(
                    writer,
                    "{} run {} (timeout {})",
                    parallelism.style(styles.count),
                    if *parallelism == 1 { "job" } else { "jobs" },
                    humantime::format_duration(*timeout),
                )?;
            }
            RunEventKind::LogStreamStarted { job_name } => {
                write!(writer, "{:>12} ", "Following".style(styles.pass))?;
                writeln!(writer, "logs of job {}", job_name.style(styles.name))?;
            }
            RunEventKind::LogChunk { chunk } => {
                writer.write_all(chunk)?;
            }
            RunEventKind::LogStreamFinished => {
                write!(writer, "{:>12} ", "Followed".style(styles.pass))?;
                writeln!(writer, "log stream ended, still waiting for the job")?;
            }
            RunEventKind::LogStreamFailed { error } => {
                write!(writer, "{:>12} ", "WARN".style(styles.warn))?;
                writeln!(
                    writer,
                    "failed to follow logs, waiting for the job without them: {}",
                    DisplayErrorChain::new(*error),
                )?;
            }
            RunEventKind::ReplicaLogs { job_name, logs } => match logs {
                Ok(logs) => {
                    write!(writer, "{:>12} ", "Logs".style(styles.pass))?;
                    writeln!(writer, "of job {}:", job_name.style(styles.name))?;
                    write_indented(writer, logs, "the job did not log anything", styles)?;
                }
                Err(error) => {
                    write!(writer, "{:>12} ", "WARN".style(styles.warn))?;
                    writeln!(
                        writer,
                        "could not retrieve logs of job {}: {}",
                        job_name.style(styles.name),
                        DisplayErrorChain::new(*error),
                    )?;
                }
            },
            RunEventKind::DiagnosticsCollected { report } => {
                write_diagnostics(writer, report, styles)?;
            }
            RunEventKind::CleanupStarted { names } => {
                write!(writer, "{:>12} ", "Cleaning".style(styles.pass))?;
                writeln!(
                    writer,
                    "up config map {} and test run {}",
                    names.config_map_name().style(styles.name),
                    names.resource_name().style(styles.name),
                )?;
            }
            RunEventKind::CleanupFinished { error } => match error {
                None => {
                    write!(writer, "{:>12} ", "Cleaned".style(styles.pass))?;
                    writeln!(writer, "up run objects")?;
                }
                Some(error) => {
                    write!(writer, "{:>12} ", "CLEANUP FAIL".style(styles.fail))?;
                    writeln!(writer, "{}", DisplayErrorChain::new(*error))?;
                }
            },
            RunEventKind::RunFinished { report } => {
                write_summary(writer, report, event, styles)?;
            }
        }

        Ok(())
    }
}

fn write_diagnostics(
    writer: &mut dyn Write,
    report: &DiagnosticReport,
    styles: &Styles,
) -> io::Result<()> {
    match &report.operator_logs {
        Some(Ok(logs)) => {
            write!(writer, "{:>12} ", "OPERATOR".style(styles.fail))?;
            if logs.is_empty() {
                writeln!(writer, "The operator did not log any errors.")?;
            } else {
                writeln!(writer, "logged these warnings and errors:")?;
                for line in logs.lines() {
                    writeln!(writer, "{:>12}   {line}", "")?;
                }
            }
        }
        Some(Err(error)) => {
            write!(writer, "{:>12} ", "WARN".style(styles.warn))?;
            writeln!(
                writer,
                "could not retrieve operator logs: {}",
                DisplayErrorChain::new(error),
            )?;
        }
        None => {}
    }

    for job in &report.jobs {
        match &job.logs {
            Ok(JobLogs::PerPod(pods)) => {
                for PodLogs { pod_name, logs } in pods {
                    write!(writer, "{:>12} ", "POD".style(styles.fail))?;
                    writeln!(
                        writer,
                        "{} of job {}:",
                        pod_name.style(styles.name),
                        job.job_name.style(styles.name),
                    )?;
                    write_indented(writer, logs, "the pod did not log anything", styles)?;
                }
            }
            Ok(JobLogs::SinceStart(logs)) => {
                write!(writer, "{:>12} ", "JOB".style(styles.fail))?;
                writeln!(writer, "{}:", job.job_name.style(styles.name))?;
                write_indented(writer, logs, "the job did not log anything", styles)?;
            }
            Err(error) => {
                write!(writer, "{:>12} ", "WARN".style(styles.warn))?;
                writeln!(
                    writer,
                    "could not retrieve logs of job {}: {}",
                    job.job_name.style(styles.name),
                    DisplayErrorChain::new(error),
                )?;
            }
        }
    }

    Ok(())
}

fn write_summary(
    writer: &mut dyn Write,
    report: &RunReport,
    event: &RunEvent<'_>,
    styles: &Styles,
) -> io::Result<()> {
    writeln!(writer, "------------")?;
    match &report.outcome {
        Ok(summary) => {
            write!(writer, "{:>12} ", "Summary".style(styles.pass))?;
            writeln!(
                writer,
                "[{:>8.3}s] {} {} {}",
                summary.duration.as_secs_f64(),
                summary.parallelism.style(styles.count),
                replicas_str(summary.parallelism),
                "passed".style(styles.pass),
            )?;
        }
        Err(failure) => {
            write!(writer, "{:>12} ", "Summary".style(styles.fail))?;
            writeln!(
                writer,
                "[{:>8.3}s] run {}",
                event.elapsed.as_secs_f64(),
                "failed".style(styles.fail),
            )?;
            write!(writer, "{:>12} ", "error".style(styles.fail))?;
            writeln!(writer, "{}", DisplayErrorChain::new(&failure.error))?;
        }
    }

    if report.cleanup.is_err() {
        write!(writer, "{:>12} ", "warning".style(styles.warn))?;
        writeln!(writer, "objects from this run may still be present in the cluster")?;
    }

    Ok(())
}

fn write_indented(
    writer: &mut dyn Write,
    text: &str,
    if_empty: &str,
    styles: &Styles,
) -> io::Result<()> {
    if text.trim().is_empty() {
        writeln!(writer, "{:>12}   ({})", "", if_empty.style(styles.skip))?;
        return Ok(());
    }
    for line in text.lines() {
        writeln!(writer, "{:>12}   {line}", "")?;
    }
    Ok(())
}

fn replicas_str(count: u32) -> &'static str {
    if count == 1 { "replica" } else { "replicas" }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    warn: Style,
    skip: Style,
    name: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.warn = Style::new().yellow().bold();
        self.skip = Style::new().dimmed();
        self.name = Style::new().blue().bold();
    }
}
