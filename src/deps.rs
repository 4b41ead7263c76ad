use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use semver::Version;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::net;
use crate::prompt::{Prompt, UserDeclined};
use crate::python::{self, Interpreter};

/// A Python package the wrapped tool imports, with an optional minimum version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub name: &'static str,
    pub min_version: Option<&'static str>,
}

pub const REQUIRED: &[Requirement] = &[
    Requirement { name: "termcolor", min_version: None },
    Requirement { name: "mido", min_version: None },
    Requirement { name: "colorama", min_version: Some("0.4.6") },
    Requirement { name: "cryptography", min_version: Some("42.0.5") },
];

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min_version {
            Some(min) => write!(f, "{}>={}", self.name, min),
            None => f.write_str(self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageStatus {
    Satisfied,
    Missing,
    /// Importable, but older than the minimum (or of unknown version).
    Outdated(String),
}

pub trait PackageProbe {
    fn status(&self, requirement: &Requirement) -> PackageStatus;
}

/// Imports the package in a child interpreter and reads its installed version.
pub struct InterpreterProbe<'a> {
    pub interpreter: &'a Interpreter,
}

// importlib.metadata is 3.8+; on older interpreters only the import is checked.
const PROBE_SCRIPT: &str = "\
import importlib, sys
importlib.import_module(sys.argv[1])
try:
    import importlib.metadata
    print(importlib.metadata.version(sys.argv[1]))
except Exception:
    print('')
";

impl PackageProbe for InterpreterProbe<'_> {
    fn status(&self, requirement: &Requirement) -> PackageStatus {
        let output = match Command::new(&self.interpreter.program)
            .args(["-c", PROBE_SCRIPT, requirement.name])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!("probe for {} failed to start: {e}", requirement.name);
                return PackageStatus::Missing;
            }
        };
        if !output.status.success() {
            return PackageStatus::Missing;
        }
        let installed = String::from_utf8_lossy(&output.stdout).trim().to_string();
        evaluate(requirement, &installed)
    }
}

fn evaluate(requirement: &Requirement, installed: &str) -> PackageStatus {
    let Some(min) = requirement.min_version else {
        return PackageStatus::Satisfied;
    };
    match (lenient_version(installed), lenient_version(min)) {
        (Some(found), Some(min)) if found >= min => PackageStatus::Satisfied,
        _ => PackageStatus::Outdated(installed.to_string()),
    }
}

/// Parse the leading numeric release segment of a Python version
/// ("1.0" -> 1.0.0, "42.0.5.post1" -> 42.0.5).
fn lenient_version(s: &str) -> Option<Version> {
    let release: String = s
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = release.split('.').filter(|p| !p.is_empty());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Ok(0), str::parse).ok()?;
    let patch = parts.next().map_or(Ok(0), str::parse).ok()?;
    Some(Version::new(major, minor, patch))
}

pub fn all_satisfied<P: PackageProbe + ?Sized>(probe: &P, requirements: &[Requirement]) -> bool {
    requirements
        .iter()
        .all(|r| probe.status(r) == PackageStatus::Satisfied)
}

/// True only if every required package is importable by the active interpreter
/// and meets its minimum version.
pub fn are_installed(config: &Config) -> bool {
    match python::find_active(&config.venv_dir) {
        Some(interpreter) => all_satisfied(&InterpreterProbe { interpreter: &interpreter }, REQUIRED),
        None => false,
    }
}

#[derive(Debug, Error)]
pub enum DepsError {
    #[error("Python is not installed or not found in PATH (tried {})", python::ALIASES.join(", "))]
    InterpreterMissing,
    #[error("failed to install Python dependencies: {}", describe_failures(.0))]
    Install(Vec<StrategyFailure>),
}

#[derive(Debug)]
pub struct StrategyFailure {
    pub installer: &'static str,
    pub error: StrategyError,
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("failed to create virtual environment: {0}")]
    Environment(String),
    #[error("failed to install {package}: {reason}")]
    Package { package: String, reason: String },
}

fn describe_failures(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.installer, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Where packages are installed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSource {
    /// `requirements.txt` shipped in the repository.
    Manifest(PathBuf),
    Packages(&'static [Requirement]),
}

impl InstallSource {
    pub fn detect(repo_path: &Path) -> Self {
        let manifest = repo_path.join("requirements.txt");
        if manifest.is_file() {
            InstallSource::Manifest(manifest)
        } else {
            InstallSource::Packages(REQUIRED)
        }
    }

    /// One `(label, extra args)` pair per installer invocation.
    fn steps(&self) -> Vec<(String, Vec<OsString>)> {
        match self {
            InstallSource::Manifest(path) => vec![(
                "requirements.txt".to_string(),
                vec![OsString::from("-r"), path.clone().into_os_string()],
            )],
            InstallSource::Packages(requirements) => requirements
                .iter()
                .map(|r| (r.to_string(), vec![OsString::from(r.to_string())]))
                .collect(),
        }
    }
}

/// A package manager able to populate the isolated environment.
pub trait Installer {
    fn name(&self) -> &'static str;
    /// Make the installer usable and create the environment if it does not exist.
    fn create_env(&mut self, system: &Interpreter, venv_dir: &Path) -> Result<(), StrategyError>;
    /// Command up to and including `install`; package arguments are appended.
    fn install_command(&self, env_python: &Path) -> Command;
}

/// Preferred: uv from PATH, or a managed copy downloaded on demand.
pub struct Uv {
    managed: PathBuf,
    program: Option<PathBuf>,
}

impl Uv {
    pub fn new(managed: PathBuf) -> Self {
        Uv {
            managed,
            program: None,
        }
    }
}

impl Installer for Uv {
    fn name(&self) -> &'static str {
        "uv"
    }

    fn create_env(&mut self, system: &Interpreter, venv_dir: &Path) -> Result<(), StrategyError> {
        let uv = ensure_uv(&self.managed).map_err(|e| StrategyError::Unavailable(format!("{e:#}")))?;
        self.program = Some(uv.clone());

        if python::venv_interpreter(venv_dir).is_file() {
            return Ok(());
        }
        run(Command::new(&uv)
            .arg("venv")
            .arg("--python")
            .arg(&system.program)
            .arg(venv_dir))
        .map_err(StrategyError::Environment)
    }

    fn install_command(&self, env_python: &Path) -> Command {
        let mut cmd = Command::new(self.program.as_deref().unwrap_or(Path::new("uv")));
        cmd.args(["pip", "install", "--python"]).arg(env_python);
        cmd
    }
}

/// Legacy: the standard library `venv` module plus pip.
pub struct Pip;

impl Installer for Pip {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn create_env(&mut self, system: &Interpreter, venv_dir: &Path) -> Result<(), StrategyError> {
        let env_python = python::venv_interpreter(venv_dir);
        if !env_python.is_file() {
            run(Command::new(&system.program).args(["-m", "venv"]).arg(venv_dir))
                .map_err(StrategyError::Environment)?;
        }

        // Environments created by uv ship without pip.
        let has_pip = Command::new(&env_python)
            .args(["-m", "pip", "--version"])
            .output()
            .is_ok_and(|o| o.status.success());
        if !has_pip {
            run(Command::new(&env_python).args(["-m", "ensurepip", "--upgrade"]))
                .map_err(StrategyError::Environment)?;
        }
        Ok(())
    }

    fn install_command(&self, env_python: &Path) -> Command {
        let mut cmd = Command::new(env_python);
        cmd.args(["-m", "pip", "install"]);
        cmd
    }
}

/// Run with inherited stdio; any non-zero exit becomes the error text.
fn run(cmd: &mut Command) -> Result<(), String> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!("running {:?}", cmd);
    let status = cmd
        .status()
        .map_err(|e| format!("could not run {program}: {e}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{program} exited with {status}"))
    }
}

fn run_installer(
    installer: &mut dyn Installer,
    system: &Interpreter,
    venv_dir: &Path,
    source: &InstallSource,
) -> Result<(), StrategyError> {
    installer.create_env(system, venv_dir)?;
    let env_python = python::venv_interpreter(venv_dir);

    for (label, args) in source.steps() {
        println!("   Installing {label}...");
        let mut cmd = installer.install_command(&env_python);
        cmd.args(&args);
        run(&mut cmd).map_err(|reason| StrategyError::Package {
            package: label,
            reason,
        })?;
    }
    Ok(())
}

/// Try each installer in order; the first that completes wins.
pub fn install_with(
    installers: &mut [Box<dyn Installer>],
    system: &Interpreter,
    venv_dir: &Path,
    source: &InstallSource,
) -> Result<(), DepsError> {
    let mut failures = Vec::new();
    for installer in installers.iter_mut() {
        info!("installing dependencies with {}", installer.name());
        match run_installer(&mut **installer, system, venv_dir, source) {
            Ok(()) => return Ok(()),
            Err(error) => {
                warn!("{} failed: {error}", installer.name());
                println!("   {} failed ({error}), trying next installer", installer.name());
                failures.push(StrategyFailure {
                    installer: installer.name(),
                    error,
                });
            }
        }
    }
    Err(DepsError::Install(failures))
}

/// Install the required packages into the isolated environment.
pub fn install(config: &Config) -> Result<(), DepsError> {
    let system = python::find_system().ok_or(DepsError::InterpreterMissing)?;
    let source = InstallSource::detect(&config.repo_path);
    println!("Installing Python dependencies...");

    let mut installers: Vec<Box<dyn Installer>> =
        vec![Box::new(Uv::new(config.uv_path.clone())), Box::new(Pip)];
    install_with(&mut installers, &system, &config.venv_dir, &source)
}

/// Print one line per requirement and return the unsatisfied ones.
pub fn report<P: PackageProbe + ?Sized>(probe: &P, requirements: &[Requirement]) -> Vec<Requirement> {
    let mut missing = Vec::new();
    for requirement in requirements {
        match probe.status(requirement) {
            PackageStatus::Satisfied => println!("   \u{2713} {requirement} is installed"),
            PackageStatus::Missing => {
                println!("   \u{2717} {requirement} is missing");
                missing.push(*requirement);
            }
            PackageStatus::Outdated(found) => {
                let found = if found.is_empty() { "unknown" } else { found.as_str() };
                println!("   \u{2717} {requirement} is outdated (found {found})");
                missing.push(*requirement);
            }
        }
    }
    missing
}

/// Report each package, then ask before installing anything missing.
pub fn check_interactive(config: &Config, prompt: &mut dyn Prompt) -> anyhow::Result<()> {
    let Some(interpreter) = python::find_active(&config.venv_dir) else {
        println!("   \u{2717} Python is not installed");
        println!();
        println!("   Python is required to run CNGT tools.");
        println!("   Please install Python from https://python.org");
        println!("   On Windows, you can also use: winget install Python.Python.3");
        println!();
        return Err(DepsError::InterpreterMissing.into());
    };
    println!("   \u{2713} Python is installed ({})", interpreter.version);

    let missing = report(&InterpreterProbe { interpreter: &interpreter }, REQUIRED);
    if missing.is_empty() {
        println!("   \u{2713} All Python packages are already installed");
        return Ok(());
    }

    println!();
    let question = format!(
        "   Missing {} Python packages. Install them automatically?",
        missing.len()
    );
    if !prompt.confirm(&question, true)? {
        println!("   Setup cancelled. You can install packages manually with:");
        for requirement in &missing {
            println!("   pip install \"{requirement}\"");
        }
        return Err(UserDeclined(
            "Python dependencies are required but installation was cancelled".to_string(),
        )
        .into());
    }

    install(config)?;
    println!("   \u{2713} Python packages installed successfully");
    Ok(())
}

// ── uv bootstrap ─────────────────────────────────────────────────────────────

const UV_BIN: &str = if cfg!(windows) { "uv.exe" } else { "uv" };

/// Release asset name of the uv build for this host, if one exists.
fn uv_asset() -> Option<String> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x86_64",
        "aarch64" => "aarch64",
        _ => return None,
    };
    let target = if cfg!(windows) {
        "pc-windows-msvc.zip"
    } else if cfg!(target_os = "macos") {
        "apple-darwin.tar.gz"
    } else if cfg!(target_os = "linux") {
        "unknown-linux-musl.tar.gz"
    } else {
        return None;
    };
    Some(format!("uv-{arch}-{target}"))
}

/// Locate uv on PATH or at `managed`, downloading it there if neither exists.
fn ensure_uv(managed: &Path) -> anyhow::Result<PathBuf> {
    if let Ok(path) = which::which("uv") {
        return Ok(path);
    }
    if managed.is_file() {
        return Ok(managed.to_path_buf());
    }

    println!("   Installing uv (modern Python package manager)...");
    let asset = uv_asset().ok_or_else(|| anyhow::anyhow!("no uv build for this platform"))?;
    let url = format!("https://github.com/astral-sh/uv/releases/latest/download/{asset}");
    let bytes = net::download(&url)?;

    let bin_dir = managed
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid uv path {}", managed.display()))?;
    let extract_dir = bin_dir.join(".uv-extract");
    std::fs::create_dir_all(&extract_dir)?;
    let archive = extract_dir.join(&asset);
    std::fs::write(&archive, &bytes)?;

    let extracted = if asset.ends_with(".zip") {
        extract_uv_zip(&archive, &extract_dir)
    } else {
        extract_uv_tar_gz(&archive, &extract_dir)
    };
    let uv_bin = extracted.inspect_err(|_| {
        let _ = std::fs::remove_dir_all(&extract_dir);
    })?;

    std::fs::copy(&uv_bin, managed)?;
    let _ = std::fs::remove_dir_all(&extract_dir);
    info!("installed uv at {}", managed.display());
    Ok(managed.to_path_buf())
}

/// Extract the `uv` binary from a `.tar.gz` archive using pure Rust.
fn extract_uv_tar_gz(archive_path: &Path, dest_dir: &Path) -> anyhow::Result<PathBuf> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let f = std::fs::File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(f));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.file_name().is_some_and(|n| n == UV_BIN) {
            let out = dest_dir.join(UV_BIN);
            entry.unpack(&out)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&out, std::fs::Permissions::from_mode(0o755))?;
            }
            return Ok(out);
        }
    }
    Err(anyhow::anyhow!("uv binary not found in archive"))
}

/// Extract `uv.exe` from the Windows `.zip` release.
fn extract_uv_zip(archive_path: &Path, dest_dir: &Path) -> anyhow::Result<PathBuf> {
    let f = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(f)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let is_uv = entry
            .enclosed_name()
            .is_some_and(|p| p.file_name().is_some_and(|n| n == UV_BIN));
        if entry.is_file() && is_uv {
            let out = dest_dir.join(UV_BIN);
            let mut file = std::fs::File::create(&out)?;
            std::io::copy(&mut entry, &mut file)?;
            return Ok(out);
        }
    }
    Err(anyhow::anyhow!("uv binary not found in archive"))
}
