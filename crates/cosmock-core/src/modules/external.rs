//! Launching external programs and the scratch space they exchange files in.

use crate::domain::{PipelineError, PipelineResult, Positions};
use crate::modules::serialization::{format_scientific, write_text_artifact};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// An executable plus the leading arguments every invocation carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProgram {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalProgram {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    /// Runs `command` to completion, capturing its output. A non-zero exit
    /// becomes an `ExternalProcessError` tagged with `code`.
    pub fn run_captured(&self, command: &mut Command, code: &'static str) -> PipelineResult<Output> {
        debug!("running {:?}", command);
        let output = command.output().map_err(|source| {
            PipelineError::io_system(
                "IO.EXTERNAL_EXEC",
                format!(
                    "failed to execute '{}': {}",
                    self.program.display(),
                    source
                ),
            )
        })?;
        if output.status.success() {
            return Ok(output);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        Err(PipelineError::external_process(
            code,
            if detail.is_empty() {
                format!(
                    "'{}' failed with {}",
                    self.program.display(),
                    status_text(output.status)
                )
            } else {
                format!(
                    "'{}' failed with {}: {}",
                    self.program.display(),
                    status_text(output.status),
                    detail
                )
            },
        ))
    }
}

pub fn status_text(status: ExitStatus) -> String {
    status.code().map_or_else(
        || "terminated by signal".to_string(),
        |code| format!("exit code {}", code),
    )
}

/// Temporary directory removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(label: &str) -> PipelineResult<Self> {
        let unix_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|source| {
                PipelineError::internal(
                    "SYS.SCRATCH_TIME",
                    format!(
                        "failed to read system time for scratch directory naming: {}",
                        source
                    ),
                )
            })?
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!(
            "cosmock-{}-{}-{}",
            label,
            std::process::id(),
            unix_nanos
        ));
        fs::create_dir_all(&path).map_err(|source| {
            PipelineError::io_system(
                "IO.SCRATCH_DIR",
                format!(
                    "failed to create scratch directory '{}': {}",
                    path.display(),
                    source
                ),
            )
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Writes positions as a headerless `x y z` table for an external reader.
pub fn write_positions(path: &Path, positions: &Positions) -> PipelineResult<()> {
    let mut content = String::with_capacity(positions.len() * 78);
    for [x, y, z] in positions.rows() {
        content.push_str(&format_scientific(x));
        content.push(' ');
        content.push_str(&format_scientific(y));
        content.push(' ');
        content.push_str(&format_scientific(z));
        content.push('\n');
    }
    write_text_artifact(path, &content)
}

/// `1,2.5,10` style list argument.
pub fn join_list(values: &[f64]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
