//! Process Runner
//!
//! All encoders, probes and the metadata tool are driven through [`CommandRunner`].
//! A runner never fails on a non-zero exit status: the caller inspects
//! [`CommandOutput::success`] and decides the policy (fallback, cleanup, skip).
//!
//! Tests swap [`SystemRunner`] for an [`FnRunner`] closure to fake external tools.

use crate::errors::{ConvertError, Result};
use crate::path_safety::is_nonempty_file;
use std::path::Path;
use std::sync::Arc;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Last non-empty stderr line, for one-line failure messages.
    pub fn error_summary(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exit code {:?}", self.exit_code))
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> CommandOutput;
}

/// Runs real processes via `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        match crate::logging::execute_external_command(program, args) {
            Ok(result) => CommandOutput {
                success: result.exit_code == Some(0),
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            },
            Err(e) => {
                tracing::error!(tool = program, error = %e, "❌ Failed to spawn external tool");
                CommandOutput {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("{:#}", e),
                }
            }
        }
    }
}

/// Closure-backed runner.
pub struct FnRunner<F>(pub F);

impl<F> CommandRunner for FnRunner<F>
where
    F: Fn(&str, &[String]) -> CommandOutput + Send + Sync,
{
    fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        (self.0)(program, args)
    }
}

/// Process-scoped handle passed into every pipeline.
#[derive(Clone)]
pub struct ConversionContext {
    pub runner: Arc<dyn CommandRunner>,
}

impl ConversionContext {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemRunner))
    }

    pub fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        self.runner.run(program, args)
    }

    /// Run an encoder expected to write `output`. On a failed run or an empty
    /// file, whatever was written is removed so no partial output survives.
    pub fn run_to_output(&self, program: &str, args: &[String], output: &Path) -> Result<()> {
        let result = self.run(program, args);
        if !result.success {
            remove_partial(output);
            return Err(ConvertError::EncodeFailure(format!(
                "{} → {}: {}",
                program,
                output.display(),
                result.error_summary()
            )));
        }
        if !is_nonempty_file(output) {
            remove_partial(output);
            return Err(ConvertError::EncodeFailure(format!(
                "{} reported success but {} is missing or empty",
                program,
                output.display()
            )));
        }
        Ok(())
    }
}

/// Best-effort removal of a partial output; absence is fine.
pub fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("⚠️ Cannot remove partial output {}: {}", path.display(), e),
    }
}

impl std::fmt::Debug for ConversionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_runner_success() {
        let out = SystemRunner.run("echo", &["hi".to_string()]);
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[test]
    fn test_system_runner_never_errors() {
        let out = SystemRunner.run("nonexistent_command_xyz", &[]);
        assert!(!out.success);
        assert!(out.exit_code.is_none());
        assert!(!out.stderr.is_empty());
    }

    #[test]
    fn test_fn_runner_sees_args() {
        let runner = FnRunner(|program: &str, args: &[String]| {
            CommandOutput::ok(format!("{} {}", program, args.join(",")))
        });
        let ctx = ConversionContext::new(Arc::new(runner));
        let out = ctx.run("magick", &["a".to_string(), "b".to_string()]);
        assert_eq!(out.stdout, "magick a,b");
    }

    #[test]
    fn test_run_to_output_cleans_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.avif");
        let out_clone = out.clone();
        let ctx = ConversionContext::new(Arc::new(FnRunner(move |_: &str, _: &[String]| {
            std::fs::write(&out_clone, b"half").unwrap();
            CommandOutput::failed("killed")
        })));
        let err = ctx.run_to_output("magick", &[], &out).unwrap_err();
        assert!(matches!(err, ConvertError::EncodeFailure(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_run_to_output_rejects_empty_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.mp4");
        let out_clone = out.clone();
        let ctx = ConversionContext::new(Arc::new(FnRunner(move |_: &str, _: &[String]| {
            std::fs::write(&out_clone, b"").unwrap();
            CommandOutput::ok("")
        })));
        assert!(ctx.run_to_output("ffmpeg", &[], &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_error_summary_uses_last_line() {
        let out = CommandOutput::failed("warning: x\nError: broken pipe\n\n");
        assert_eq!(out.error_summary(), "Error: broken pipe");
        let empty = CommandOutput::failed("");
        assert_eq!(empty.error_summary(), "exit code Some(1)");
    }
}
