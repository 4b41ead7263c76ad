use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use semver::Version;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::net;
use crate::prompt::Prompt;

const RELEASES_URL: &str = "https://api.github.com/repos/snupai/cngt-cli/releases/latest";

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Background checks run at most once per window.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Release architecture is fixed; only the OS varies.
const RELEASE_ARCH: &str = "amd64";

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to check for updates: {0}")]
    Check(reqwest::Error),
    #[error("release feed returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to decode release info: {0}")]
    Decode(serde_json::Error),
    #[error("no suitable binary found for {0}")]
    NoSuitableBinary(String),
    #[error("failed to download update: {0}")]
    Download(reqwest::Error),
    #[error("failed to stage downloaded binary at {path}: {source}")]
    Stage {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to locate running executable: {0}")]
    CurrentExe(std::io::Error),
    #[error("failed to replace binary: {0}")]
    Swap(std::io::Error),
}

/// Fetch the latest release descriptor. No retry.
pub fn fetch_latest(url: &str) -> Result<Release, UpdateError> {
    let client = net::client(net::API_TIMEOUT).map_err(UpdateError::Check)?;
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .send()
        .map_err(UpdateError::Check)?;

    if !response.status().is_success() {
        return Err(UpdateError::Status(response.status()));
    }
    let body = response.bytes().map_err(UpdateError::Check)?;
    parse_release(&body)
}

pub fn parse_release(body: &[u8]) -> Result<Release, UpdateError> {
    serde_json::from_slice(body).map_err(UpdateError::Decode)
}

/// Latest release, and whether its tag differs from the running version.
pub fn check_for_updates() -> Result<(Release, bool), UpdateError> {
    let release = fetch_latest(RELEASES_URL)?;
    let has_update = !versions_match(&release.tag_name, CURRENT_VERSION);
    Ok((release, has_update))
}

/// Compare a release tag with a version string, ignoring a leading `v`.
///
/// Semantic versions compare by precedence (build metadata ignored); anything
/// else compares as plain text.
pub fn versions_match(tag: &str, current: &str) -> bool {
    let tag = strip_v(tag);
    let current = strip_v(current);
    match (Version::parse(tag), Version::parse(current)) {
        (Ok(a), Ok(b)) => a.cmp_precedence(&b).is_eq(),
        _ => tag == current,
    }
}

fn strip_v(version: &str) -> &str {
    let version = version.trim();
    version.strip_prefix(['v', 'V']).unwrap_or(version)
}

pub fn asset_name_for(os: &str) -> String {
    match os {
        "windows" => format!("cngt-cli-windows-{RELEASE_ARCH}.exe"),
        "macos" => format!("cngt-cli-darwin-{RELEASE_ARCH}"),
        _ => format!("cngt-cli-linux-{RELEASE_ARCH}"),
    }
}

pub fn select_asset<'a>(release: &'a Release, name: &str) -> Option<&'a Asset> {
    release.assets.iter().find(|a| a.name == name)
}

/// Download the platform asset of `release` and swap it in for the running binary.
pub fn apply(release: &Release) -> Result<(), UpdateError> {
    let name = asset_name_for(std::env::consts::OS);
    let asset = select_asset(release, &name).ok_or_else(|| {
        UpdateError::NoSuitableBinary(format!("{}/{RELEASE_ARCH}", std::env::consts::OS))
    })?;

    let current = std::env::current_exe()
        .and_then(std::fs::canonicalize)
        .map_err(UpdateError::CurrentExe)?;

    info!("downloading {}", asset.browser_download_url);
    let bytes = net::download(&asset.browser_download_url).map_err(UpdateError::Download)?;

    // Staged beside the executable so both renames stay on one filesystem.
    let staged = with_suffix(&current, ".new");
    stage(&staged, &bytes).map_err(|source| {
        let _ = std::fs::remove_file(&staged);
        UpdateError::Stage {
            path: staged.clone(),
            source,
        }
    })?;

    swap_binary(&current, &staged).map_err(|e| {
        let _ = std::fs::remove_file(&staged);
        UpdateError::Swap(e)
    })
}

fn stage(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Replace `current` with `new`: current -> `.backup`, new -> current, drop backup.
///
/// If moving `new` into place fails, the backup is renamed back first, so
/// `current` is never left missing.
pub fn swap_binary(current: &Path, new: &Path) -> std::io::Result<()> {
    let backup = with_suffix(current, ".backup");
    // Left over from an earlier run where the backup could not be deleted.
    let _ = std::fs::remove_file(&backup);

    std::fs::rename(current, &backup)?;
    if let Err(e) = std::fs::rename(new, current) {
        if let Err(restore) = std::fs::rename(&backup, current) {
            error!(
                "could not restore {} from {}: {restore}",
                current.display(),
                backup.display()
            );
        }
        return Err(e);
    }

    // Windows refuses to delete the image of a running process.
    if let Err(e) = std::fs::remove_file(&backup) {
        debug!("could not remove {}: {e}", backup.display());
    }
    Ok(())
}

/// The `upgrade` command: check, confirm, apply.
pub fn self_update(prompt: &mut dyn Prompt) -> anyhow::Result<()> {
    println!("Checking for CLI updates...");
    let (release, has_update) = check_for_updates()?;

    if !has_update {
        println!("CLI is up to date ({CURRENT_VERSION})");
        return Ok(());
    }

    println!("New version available: {}", release.tag_name);
    if !prompt.confirm("Would you like to update?", false)? {
        println!("Update skipped.");
        return Ok(());
    }

    println!("Updating from {CURRENT_VERSION} to {}...", release.tag_name);
    apply(&release)?;
    println!("Successfully updated to {}", release.tag_name);
    Ok(())
}

// ── Background check ──────────────────────────────────────────────────────────

/// True unless the marker was modified less than [`CHECK_INTERVAL`] before `now`.
pub fn should_check(marker: &Path, now: SystemTime) -> bool {
    let fresh = std::fs::metadata(marker)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| now.duration_since(mtime).ok())
        .is_some_and(|age| age < CHECK_INTERVAL);
    !fresh
}

/// Run `check` if the throttle window has elapsed, then (re)write the marker.
/// Returns whether `check` ran.
///
/// The marker is only written once `check` returns, whatever its outcome, so a
/// check cut short by process exit is retried on the next invocation.
pub fn throttled_check<F: FnOnce()>(marker: &Path, now: SystemTime, check: F) -> bool {
    if !should_check(marker, now) {
        return false;
    }
    check();
    if let Err(e) = std::fs::write(marker, chrono::Utc::now().to_rfc3339()) {
        debug!("could not write {}: {e}", marker.display());
    }
    true
}

/// Fire-and-forget update check.
///
/// The thread is never joined; if the process exits first the check is simply
/// lost and retried on a later invocation. Every error is swallowed.
pub fn spawn_background_check(config: &Config) {
    if config.skip_update_check {
        return;
    }
    let marker = config.update_marker.clone();
    let spawned = std::thread::Builder::new()
        .name("update-check".to_string())
        .spawn(move || {
            throttled_check(&marker, SystemTime::now(), || match check_for_updates() {
                Ok((release, true)) => eprintln!(
                    "\n[cngt] New version {} available! Run 'cngt-cli upgrade' to update.\n",
                    release.tag_name
                ),
                Ok(_) => debug!("cngt-cli is up to date"),
                Err(e) => debug!("background update check failed: {e}"),
            });
        });
    if let Err(e) = spawned {
        debug!("could not start update check: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "tag_name": "v1.2.0",
        "name": "v1.2.0",
        "assets": [
            {"name": "cngt-cli-linux-amd64", "browser_download_url": "https://example.invalid/linux", "size": 1},
            {"name": "cngt-cli-darwin-amd64", "browser_download_url": "https://example.invalid/darwin"},
            {"name": "cngt-cli-windows-amd64.exe", "browser_download_url": "https://example.invalid/win"}
        ]
    }"#;

    #[test]
    fn prefixed_tag_equals_plain_version() {
        assert!(versions_match("v2.3.0", "2.3.0"));
        assert!(versions_match("2.3.0", "v2.3.0"));
        assert!(versions_match("2.3.0", "2.3.0"));
    }

    #[test]
    fn different_version_is_an_update() {
        assert!(!versions_match("v2.3.1", "2.3.0"));
        // Any difference counts, not just newer.
        assert!(!versions_match("v2.2.9", "2.3.0"));
    }

    #[test]
    fn non_semver_tags_compare_as_text() {
        assert!(versions_match("vnightly", "nightly"));
        assert!(!versions_match("nightly", "1.0.0"));
    }

    #[test]
    fn build_metadata_is_ignored() {
        assert!(versions_match("v1.0.0+linux", "1.0.0"));
    }

    #[test]
    fn parses_release_feed() {
        let release = parse_release(SAMPLE.as_bytes()).unwrap();
        assert_eq!(release.tag_name, "v1.2.0");
        assert_eq!(release.assets.len(), 3);
        assert_eq!(release.assets[0].browser_download_url, "https://example.invalid/linux");
    }

    #[test]
    fn release_without_assets_parses_empty() {
        let release = parse_release(br#"{"tag_name": "v1.0.0"}"#).unwrap();
        assert!(release.assets.is_empty());
    }

    #[test]
    fn malformed_feed_is_decode_error() {
        assert!(matches!(
            parse_release(b"<html>rate limited</html>"),
            Err(UpdateError::Decode(_))
        ));
    }

    #[test]
    fn asset_names_per_os() {
        assert_eq!(asset_name_for("linux"), "cngt-cli-linux-amd64");
        assert_eq!(asset_name_for("macos"), "cngt-cli-darwin-amd64");
        assert_eq!(asset_name_for("windows"), "cngt-cli-windows-amd64.exe");
        assert_eq!(asset_name_for("freebsd"), "cngt-cli-linux-amd64");
    }

    #[test]
    fn selects_matching_asset_only() {
        let release = parse_release(SAMPLE.as_bytes()).unwrap();
        let asset = select_asset(&release, "cngt-cli-darwin-amd64").unwrap();
        assert_eq!(asset.browser_download_url, "https://example.invalid/darwin");
        assert!(select_asset(&release, "cngt-cli-linux-arm64").is_none());
    }

    #[test]
    fn swap_replaces_binary_and_removes_backup() {
        let dir = tempdir().unwrap();
        let current = dir.path().join("cngt-cli");
        let new = dir.path().join("cngt-cli.new");
        std::fs::write(&current, "old").unwrap();
        std::fs::write(&new, "new").unwrap();

        swap_binary(&current, &new).unwrap();

        assert_eq!(std::fs::read_to_string(&current).unwrap(), "new");
        assert!(!new.exists());
        assert!(!dir.path().join("cngt-cli.backup").exists());
    }

    #[test]
    fn failed_second_rename_restores_original() {
        let dir = tempdir().unwrap();
        let current = dir.path().join("cngt-cli");
        std::fs::write(&current, "#!/bin/sh\necho original\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&current, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        // The staged binary is missing, so moving it into place fails.
        let missing = dir.path().join("cngt-cli.new");
        assert!(swap_binary(&current, &missing).is_err());

        assert!(current.is_file());
        assert!(!dir.path().join("cngt-cli.backup").exists());
        assert_eq!(
            std::fs::read_to_string(&current).unwrap(),
            "#!/bin/sh\necho original\n"
        );

        #[cfg(unix)]
        {
            let output = std::process::Command::new(&current).output().unwrap();
            assert!(output.status.success());
            assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "original");
        }
    }

    #[test]
    fn fresh_marker_skips_check() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("last_update_check");
        std::fs::write(&marker, "2026-01-01T00:00:00Z").unwrap();

        let calls = Cell::new(0);
        let ran = throttled_check(&marker, SystemTime::now(), || calls.set(calls.get() + 1));

        assert!(!ran);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn absent_marker_runs_check_and_writes_marker() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("last_update_check");

        let calls = Cell::new(0);
        let ran = throttled_check(&marker, SystemTime::now(), || calls.set(calls.get() + 1));

        assert!(ran);
        assert_eq!(calls.get(), 1);
        let stamp = std::fs::read_to_string(&marker).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok(), "{stamp}");
        // A second call inside the window does nothing.
        assert!(!throttled_check(&marker, SystemTime::now(), || calls.set(calls.get() + 1)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn stale_marker_runs_check_and_rewrites_marker() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("last_update_check");
        std::fs::write(&marker, "stale").unwrap();

        let later = SystemTime::now() + CHECK_INTERVAL + Duration::from_secs(60);
        let calls = Cell::new(0);
        let ran = throttled_check(&marker, later, || calls.set(calls.get() + 1));

        assert!(ran);
        assert_eq!(calls.get(), 1);
        let stamp = std::fs::read_to_string(&marker).unwrap();
        assert_ne!(stamp, "stale");
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[test]
    fn marker_is_written_only_after_check_returns() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("last_update_check");

        let seen_during_check = Cell::new(None);
        let ran = throttled_check(&marker, SystemTime::now(), || {
            seen_during_check.set(Some(marker.exists()));
        });

        assert!(ran);
        assert_eq!(seen_during_check.get(), Some(false));
        assert!(marker.exists());
    }

    #[test]
    fn skip_update_check_spawns_nothing() {
        let dir = tempdir().unwrap();
        let config = Config::at(dir.path().to_path_buf(), true);
        spawn_background_check(&config);
        assert!(!config.update_marker.exists());
    }
}
