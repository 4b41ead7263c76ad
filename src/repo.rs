use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, Progress, RemoteCallbacks, Repository};
use thiserror::Error;
use tracing::{debug, info};

pub const REPO_URL: &str = "https://github.com/SebiAi/custom-nothing-glyph-tools.git";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to clone repository: {0}")]
    Clone(git2::Error),
    #[error("failed to open repository: {0}")]
    Open(git2::Error),
    #[error("failed to pull updates: {0}")]
    Pull(git2::Error),
    #[error("failed to pull updates: HEAD is not on a branch")]
    Detached,
    #[error("failed to pull updates: local branch '{0}' has diverged from origin")]
    Diverged(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoState {
    NotInstalled,
    InstalledAt(String),
    InstalledUnknownCommit,
    Error(String),
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoState::NotInstalled => f.write_str("Not installed"),
            RepoState::InstalledAt(commit) => write!(f, "Installed (commit: {commit})"),
            RepoState::InstalledUnknownCommit => f.write_str("Installed (unknown commit)"),
            RepoState::Error(e) => write!(f, "Error ({e})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    UpToDate,
    FastForwarded(String),
}

/// `.git` metadata at `path` counts as installed; content is not validated.
pub fn is_installed(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Clone the wrapped repository into `path`.
pub fn install(path: &Path) -> Result<(), RepoError> {
    clone_from(REPO_URL, path)
}

/// Full clone of `url` into `path`, printing transfer progress.
///
/// If the clone fails and `path` did not exist beforehand, whatever was
/// written is removed so the path never looks installed.
pub fn clone_from(url: &str, path: &Path) -> Result<(), RepoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| RepoError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let existed = path.exists();

    info!("cloning {url} into {}", path.display());
    let mut reporter = ProgressReporter::default();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(|stats| {
        reporter.update(&stats);
        true
    });
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    let result = RepoBuilder::new().fetch_options(fetch_options).clone(url, path);
    println!();

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            if !existed {
                let _ = std::fs::remove_dir_all(path);
            }
            Err(RepoError::Clone(e))
        }
    }
}

/// Fetch the checked-out branch from `origin` and fast-forward to it.
pub fn update(path: &Path) -> Result<PullOutcome, RepoError> {
    let repo = Repository::open(path).map_err(RepoError::Open)?;

    let head = repo.head().map_err(RepoError::Pull)?;
    if !head.is_branch() {
        return Err(RepoError::Detached);
    }
    let branch = head.shorthand().ok_or(RepoError::Detached)?.to_string();
    let refname = format!("refs/heads/{branch}");
    drop(head);

    let mut reporter = ProgressReporter::default();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(|stats| {
        reporter.update(&stats);
        true
    });
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    let mut remote = repo.find_remote("origin").map_err(RepoError::Pull)?;
    remote
        .fetch(&[branch.as_str()], Some(&mut fetch_options), None)
        .map_err(RepoError::Pull)?;

    let fetch_head = repo.find_reference("FETCH_HEAD").map_err(RepoError::Pull)?;
    let fetched = repo
        .reference_to_annotated_commit(&fetch_head)
        .map_err(RepoError::Pull)?;
    let (analysis, _) = repo.merge_analysis(&[&fetched]).map_err(RepoError::Pull)?;

    if analysis.is_up_to_date() {
        debug!("{branch} already up to date");
        return Ok(PullOutcome::UpToDate);
    }
    if !analysis.is_fast_forward() {
        return Err(RepoError::Diverged(branch));
    }

    let mut reference = repo.find_reference(&refname).map_err(RepoError::Pull)?;
    reference
        .set_target(fetched.id(), "cngt-cli: fast-forward")
        .map_err(RepoError::Pull)?;
    repo.set_head(&refname).map_err(RepoError::Pull)?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))
        .map_err(RepoError::Pull)?;

    let commit = short_hash(fetched.id());
    info!("fast-forwarded {branch} to {commit}");
    Ok(PullOutcome::FastForwarded(commit))
}

/// Current commit of the clone at `path`. Never fails; problems degrade to a state.
pub fn status(path: &Path) -> RepoState {
    if !is_installed(path) {
        return RepoState::NotInstalled;
    }
    let repo = match Repository::open(path) {
        Ok(repo) => repo,
        Err(e) => return RepoState::Error(format!("failed to open repository: {}", e.message())),
    };
    let state = match repo.head().and_then(|head| head.peel_to_commit()) {
        Ok(commit) => RepoState::InstalledAt(short_hash(commit.id())),
        Err(e) => {
            debug!("could not resolve HEAD in {}: {e}", path.display());
            RepoState::InstalledUnknownCommit
        }
    };
    state
}

fn short_hash(oid: git2::Oid) -> String {
    oid.to_string().chars().take(7).collect()
}

/// Prints "Receiving objects" / "Resolving deltas" lines, only when the
/// percentage changes.
#[derive(Default)]
struct ProgressReporter {
    last: Option<(bool, usize)>,
}

impl ProgressReporter {
    fn update(&mut self, stats: &Progress<'_>) {
        let Some((resolving, percent, done, total)) = progress_line(
            stats.received_objects(),
            stats.total_objects(),
            stats.indexed_deltas(),
            stats.total_deltas(),
        ) else {
            return;
        };
        if self.last == Some((resolving, percent)) {
            return;
        }
        self.last = Some((resolving, percent));

        let label = if resolving { "Resolving deltas" } else { "Receiving objects" };
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r{label}: {percent:3}% ({done}/{total})");
        let _ = stdout.flush();
    }
}

/// (resolving_deltas, percent, done, total) for the current transfer phase.
fn progress_line(
    received: usize,
    total: usize,
    indexed_deltas: usize,
    total_deltas: usize,
) -> Option<(bool, usize, usize, usize)> {
    if total == 0 {
        return None;
    }
    if received < total || total_deltas == 0 {
        Some((false, received * 100 / total, received, total))
    } else {
        Some((
            true,
            indexed_deltas * 100 / total_deltas,
            indexed_deltas,
            total_deltas,
        ))
    }
}
