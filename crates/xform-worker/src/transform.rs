//! The pluggable transformation.
//!
//! A transform turns one local file into output text. It is called
//! synchronously and may block; the pipeline runs it on the blocking pool.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::TransformError;

/// Transform a local file into output text.
pub trait Transform: Send + Sync {
    fn transform(&self, path: &Path) -> Result<String, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(&Path) -> Result<String, TransformError> + Send + Sync,
{
    fn transform(&self, path: &Path) -> Result<String, TransformError> {
        self(path)
    }
}

/// Runs an external program with the file path as its last argument.
///
/// Stdout becomes the output text. A non-zero exit fails the file with the
/// program's stderr (or its exit status when stderr is empty).
#[derive(Debug, Clone)]
pub struct CommandTransform {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTransform {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument placed before the file path.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Parse a whitespace-separated command line such as `"clang -E"`.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(parts.fold(Self::new(program), |cmd, arg| cmd.arg(arg)))
    }
}

impl Transform for CommandTransform {
    fn transform(&self, path: &Path) -> Result<String, TransformError> {
        debug!("Running {} on {}", self.program.display(), path.display());

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .map_err(|e| {
                TransformError::new(format!("failed to run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.program.display(), output.status)
            } else {
                stderr
            };
            return Err(TransformError::new(message));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| TransformError::new("transform produced non UTF-8 output"))
    }
}
