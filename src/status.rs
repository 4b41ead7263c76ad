use std::fmt::{self, Write as _};

use crate::config::{Config, ConfigError};
use crate::deps::{self, InterpreterProbe};
use crate::python;
use crate::repo::{self, RepoState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterState {
    Found(String),
    NotFound,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    AllPresent,
    Missing,
    Unknown,
}

/// Snapshot of the installation; recomputed on every call, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationStatus {
    pub repository: RepoState,
    pub interpreter: InterpreterState,
    pub dependencies: DependencyState,
}

impl fmt::Display for InterpreterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpreterState::Found(version) => f.write_str(version),
            InterpreterState::NotFound => f.write_str("Not found"),
            InterpreterState::Unknown => f.write_str("Unknown"),
        }
    }
}

impl fmt::Display for DependencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyState::AllPresent => f.write_str("Installed"),
            DependencyState::Missing => f.write_str("Missing dependencies"),
            DependencyState::Unknown => f.write_str("Unknown"),
        }
    }
}

pub fn collect(config: &Config) -> InstallationStatus {
    let repository = repo::status(&config.repo_path);
    let interpreter = python::find_active(&config.venv_dir);

    let dependencies = match &interpreter {
        Some(i) if deps::all_satisfied(&InterpreterProbe { interpreter: i }, deps::REQUIRED) => {
            DependencyState::AllPresent
        }
        _ => DependencyState::Missing,
    };
    let interpreter = match interpreter {
        Some(i) => InterpreterState::Found(i.version),
        None => InterpreterState::NotFound,
    };

    InstallationStatus {
        repository,
        interpreter,
        dependencies,
    }
}

/// Status when no configuration could be resolved: nothing can be probed.
pub fn unavailable(err: &ConfigError) -> InstallationStatus {
    InstallationStatus {
        repository: RepoState::Error(format!("error loading config: {err}")),
        interpreter: InterpreterState::Unknown,
        dependencies: DependencyState::Unknown,
    }
}

/// "1.0.0 (commit: abc1234, built: 2026-10-01T12:00:00+00:00)"
pub fn full_version() -> String {
    let built = env!("CNGT_BUILD_TIMESTAMP");
    let built = built
        .parse::<i64>()
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map_or_else(|| built.to_string(), |t| t.to_rfc3339());
    format!(
        "{} (commit: {}, built: {built})",
        env!("CARGO_PKG_VERSION"),
        env!("CNGT_BUILD_GIT_HASH")
    )
}

pub fn render(status: &InstallationStatus, version: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CNGT CLI Version: {version}");
    let _ = writeln!(out, "CNGT Repository: {}", status.repository);
    let _ = writeln!(out, "Python: {}", status.interpreter);
    let _ = writeln!(out, "Dependencies: {}", status.dependencies);

    if status.repository == RepoState::NotInstalled {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Tip: Run 'cngt-cli setup' to install CNGT and dependencies interactively"
        );
    }
    out
}
