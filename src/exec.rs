use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::python;

pub const MIGRATE_SCRIPT: &str = "GlyphMigrate.py";
pub const MODDER_SCRIPT: &str = "GlyphModder.py";
pub const TRANSLATOR_SCRIPT: &str = "GlyphTranslator.py";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("script {0} not found")]
    ScriptNotFound(String),
    #[error("Python is not installed or not found in PATH")]
    InterpreterMissing,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Run `script` from the wrapped repository and return the child's exit code.
///
/// The child inherits stdin/stdout/stderr and runs with the repository root
/// as its working directory. `args` are forwarded verbatim after the script path.
pub fn run_script(config: &Config, script: &str, args: &[OsString]) -> Result<i32, ExecError> {
    if !config.repo_path.join(script).is_file() {
        return Err(ExecError::ScriptNotFound(script.to_string()));
    }
    let interpreter =
        python::find_active(&config.venv_dir).ok_or(ExecError::InterpreterMissing)?;
    run_with(&interpreter.program, &config.repo_path, script, args)
}

pub fn script_command(interpreter: &Path, repo: &Path, script: &str, args: &[OsString]) -> Command {
    let mut cmd = Command::new(interpreter);
    cmd.arg(repo.join(script))
        .args(args)
        .current_dir(repo)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    cmd
}

pub fn run_with(
    interpreter: &Path,
    repo: &Path,
    script: &str,
    args: &[OsString],
) -> Result<i32, ExecError> {
    let mut cmd = script_command(interpreter, repo, script, args);
    debug!("dispatching {:?}", cmd);
    let status = cmd.status().map_err(|source| ExecError::Spawn {
        program: interpreter.display().to_string(),
        source,
    })?;
    Ok(exit_code(status))
}

/// Exit code to propagate; on Unix a signal-terminated child maps to 128 + signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
