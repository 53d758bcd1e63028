use std::{
    fmt::Display,
    fs::File,
    path::Path,
    process::{Child, ExitStatus, Stdio},
};

use miette::{Context, IntoDiagnostic};
use tracing::{debug, warn};

use super::command::Stage;
use crate::result::{Error, Result};

/// An ordered chain of programs, each one reading the standard output of the previous one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(first: Stage) -> Self {
        Self {
            stages: vec![first],
        }
    }

    /// Add a stage consuming the output of the current last stage
    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}

/// Something able to execute a [`Pipeline`] to completion
pub trait PipelineRunner {
    /// Run every stage of the pipeline, writing the output of the last one to `output`.
    ///
    /// Blocks until all stages have exited.
    /// Must return [`Error::PipelineFailure`] if any of them was not successful.
    fn run(&self, pipeline: &Pipeline, output: &Path) -> Result<()>;
}

/// Run pipelines as OS processes connected by pipes
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl PipelineRunner for ProcessRunner {
    fn run(&self, pipeline: &Pipeline, output: &Path) -> Result<()> {
        let stages = pipeline.stages();

        // Truncates whatever an aborted run may have left there
        let out_file = File::create(output)
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not create '{}'", output.display()))?;
        let mut out_file = Some(out_file);

        let mut children: Vec<Child> = Vec::with_capacity(stages.len());
        for (i, stage) in stages.iter().enumerate() {
            let stdin = match children.last_mut().and_then(|child| child.stdout.take()) {
                Some(stdout) => Stdio::from(stdout),
                None => Stdio::null(),
            };
            let stdout = if i + 1 == stages.len() {
                out_file.take().map_or_else(Stdio::null, Stdio::from)
            } else {
                Stdio::piped()
            };

            debug!("Spawning pipeline stage: {stage}");
            let spawned = stage
                .command()
                .stdin(stdin)
                .stdout(stdout)
                .stderr(Stdio::inherit())
                .spawn();

            match spawned
                .into_diagnostic()
                .wrap_err_with(|| format!("Could not run {} command", stage.program()))
            {
                Ok(child) => children.push(child),
                Err(report) => {
                    kill_all(&mut children);
                    return Err(report.into());
                }
            }
        }

        let mut statuses: Vec<ExitStatus> = Vec::with_capacity(children.len());
        for (child, stage) in children.iter_mut().zip(stages) {
            let status = child
                .wait()
                .into_diagnostic()
                .wrap_err_with(|| format!("Could not wait for {} command", stage.program()))?;
            debug!("{} exited with {status}", stage.program());
            statuses.push(status);
        }

        // When a downstream stage dies, the upstream ones usually get a broken pipe.
        // The last failing stage is the one that explains the failure.
        match stages.iter().zip(&statuses).rev().find(|(_, status)| !status.success()) {
            Some((stage, status)) => Err(Error::PipelineFailure {
                stage: stage.to_string(),
                pipeline: pipeline.to_string(),
                status: *status,
            }),
            None => Ok(()),
        }
    }
}

fn kill_all(children: &mut [Child]) {
    for child in children {
        if let Err(err) = child.kill() {
            warn!("Could not kill a pipeline stage: {err}");
        }
        let _ = child.wait();
    }
}
