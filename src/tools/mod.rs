//! External tool runners
//!
//! The atlas generator and the texture compressor are separate programs.
//! A run succeeds only when the process exits with status 0 within the
//! timeout *and* leaves its expected output file behind.

pub mod atlas_gen;
pub mod texconv;

pub use atlas_gen::{AtlasGenOptions, AtlasGenerator, AtlasOutputs, ATLAS_JSON_NAME};
pub use texconv::TextureCompressor;

use crate::core::errors::{PipelineError, PipelineResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Captured output of a successful tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub output: PathBuf,
    pub stdout: String,
    pub stderr: String,
}

/// One external program and the limits it runs under
#[derive(Debug, Clone)]
pub struct ExternalTool {
    pub name: &'static str,
    pub program: PathBuf,
    pub timeout: Duration,
}

impl ExternalTool {
    pub fn new(name: &'static str, program: impl Into<PathBuf>) -> Self {
        Self {
            name,
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn failure(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::ExternalToolFailure {
            tool: self.name.to_string(),
            reason: reason.into(),
        }
    }

    /// Run in `working_dir` and require `expected` to exist afterwards
    pub async fn run(
        &self,
        args: &[OsString],
        working_dir: &Path,
        expected: &Path,
    ) -> PipelineResult<ToolOutput> {
        tracing::info!("Running {} ({})", self.name, self.program.display());
        tracing::debug!("{} arguments: {:?}", self.name, args);

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(working_dir)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(self.failure(format!(
                    "could not start {}: {e}",
                    self.program.display()
                )))
            }
            Err(_) => {
                return Err(self.failure(format!(
                    "timed out after {}s",
                    self.timeout.as_secs_f64()
                )))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|code| format!("exit code {code}"))
                .unwrap_or_else(|| "terminated by signal".to_string());
            let detail = stderr.trim();
            return Err(self.failure(if detail.is_empty() {
                status
            } else {
                format!("{status}: {detail}")
            }));
        }

        let output_path = working_dir.join(expected);
        if !output_path.exists() {
            return Err(self.failure(format!(
                "exited successfully but did not write {}",
                output_path.display()
            )));
        }

        tracing::debug!("{} wrote {}", self.name, output_path.display());
        Ok(ToolOutput {
            output: output_path,
            stdout,
            stderr,
        })
    }
}
