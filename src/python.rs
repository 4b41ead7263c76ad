use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

/// Command names tried, in order, when looking for a system interpreter.
/// The default name differs between platforms and distributions.
pub const ALIASES: &[&str] = &["python3", "python", "py"];

/// A Python interpreter that answered the version probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: PathBuf,
    /// First line of `--version`, e.g. "Python 3.12.1".
    pub version: String,
}

/// Return the first candidate for which `probe` yields an interpreter.
pub fn first_responding<I, P>(candidates: I, probe: P) -> Option<Interpreter>
where
    I: IntoIterator<Item = OsString>,
    P: Fn(&OsString) -> Option<Interpreter>,
{
    candidates.into_iter().find_map(|c| probe(&c))
}

/// Find a system Python 3 among [`ALIASES`].
pub fn find_system() -> Option<Interpreter> {
    first_responding(ALIASES.iter().map(OsString::from), probe_version)
}

/// Find the interpreter to use for checks and dispatch: the isolated
/// environment's interpreter if present, otherwise a system one.
pub fn find_active(venv_dir: &Path) -> Option<Interpreter> {
    let venv_python = venv_interpreter(venv_dir);
    let candidates = venv_python
        .is_file()
        .then(|| venv_python.into_os_string())
        .into_iter()
        .chain(ALIASES.iter().map(OsString::from));
    first_responding(candidates, probe_version)
}

/// Path of the interpreter inside a virtual environment.
pub fn venv_interpreter(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}

/// Run `<candidate> --version` and accept it if it reports Python 3.
///
/// Bare names are resolved through PATH so the returned program is absolute.
pub fn probe_version(candidate: &OsString) -> Option<Interpreter> {
    let program = if Path::new(candidate).is_absolute() {
        PathBuf::from(candidate)
    } else {
        which::which(candidate).ok()?
    };

    let output = Command::new(&program).arg("--version").output().ok()?;
    if !output.status.success() {
        debug!("{} --version exited with {}", program.display(), output.status);
        return None;
    }

    // Python 2 prints its version on stderr.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let version = if stdout.contains("Python") { &*stdout } else { &*stderr };
    let version = version.lines().next().unwrap_or_default().trim().to_string();

    match parse_python_version(&version) {
        Some((3, _)) => {
            debug!("using interpreter {} ({version})", program.display());
            Some(Interpreter { program, version })
        }
        _ => {
            debug!("skipping {}: {version:?}", program.display());
            None
        }
    }
}

pub fn parse_python_version(s: &str) -> Option<(u32, u32)> {
    let s = s.trim().strip_prefix("Python ")?.trim();
    let mut parts = s.splitn(3, '.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    Some((major, minor))
}
