//! Shell command resolution.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use crate::service::PtyError;

/// Program and arguments to run inside the PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ShellCommand {
    /// Parse a shell-quoted command line such as `bash -l`.
    ///
    /// Bare program names are resolved on `PATH` when possible and passed
    /// through unchanged otherwise.
    ///
    /// # Errors
    /// Returns `InvalidCommand` for unbalanced quoting or an empty line.
    pub fn parse(line: &str) -> Result<Self, PtyError> {
        let mut parts =
            shlex::split(line).ok_or_else(|| PtyError::InvalidCommand(line.to_string()))?;
        if parts.is_empty() {
            return Err(PtyError::InvalidCommand("empty command".into()));
        }
        let program = parts.remove(0);
        Ok(Self {
            program: resolve(&program),
            args: parts,
        })
    }

    /// The user's interactive shell.
    ///
    /// Uses `$SHELL`, then `bash` on `PATH`, then `/bin/sh`.
    #[must_use]
    pub fn detect() -> Self {
        Self::detect_from(std::env::var_os("SHELL").as_deref())
    }

    fn detect_from(shell_env: Option<&OsStr>) -> Self {
        let program = shell_env
            .map(Path::new)
            .filter(|p| p.is_absolute() && p.is_file())
            .map(Path::to_path_buf)
            .or_else(|| which::which("bash").ok())
            .unwrap_or_else(|| PathBuf::from("/bin/sh"));
        tracing::debug!(program = %program.display(), "Detected shell");
        Self {
            program,
            args: Vec::new(),
        }
    }
}

fn resolve(program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        return path.to_path_buf();
    }
    which::which(program).unwrap_or_else(|_| path.to_path_buf())
}
