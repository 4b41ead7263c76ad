use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "cngt-cli";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,      // <platform data dir>/cngt-cli (or CNGT_DATA_DIR)
    pub repo_path: PathBuf,     // data_dir/cngt
    pub venv_dir: PathBuf,      // data_dir/venv
    pub uv_path: PathBuf,       // data_dir/bin/uv (managed copy when uv is not on PATH)
    pub update_marker: PathBuf, // data_dir/last_update_check
    pub skip_update_check: bool, // CNGT_NO_UPDATE_CHECK=1
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine data directory")]
    NoDataDir,
    #[error("failed to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Target platform families with distinct data-directory conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }
}

pub fn load() -> Result<Config, ConfigError> {
    let data_dir = match std::env::var("CNGT_DATA_DIR") {
        Ok(v) if Path::new(&v).is_absolute() => PathBuf::from(v),
        _ => base_dir(Platform::current(), |key| std::env::var(key).ok())
            .or_else(dirs::data_dir)
            .ok_or(ConfigError::NoDataDir)?
            .join(APP_DIR),
    };

    // create_dir_all already tolerates a directory that exists or races into existence.
    std::fs::create_dir_all(&data_dir).map_err(|source| ConfigError::CreateDir {
        path: data_dir.clone(),
        source,
    })?;

    let skip_update_check = std::env::var("CNGT_NO_UPDATE_CHECK")
        .map(|v| v == "1")
        .unwrap_or(false);

    Ok(Config::at(data_dir, skip_update_check))
}

impl Config {
    /// Derive every path from an already-resolved data directory.
    pub fn at(data_dir: PathBuf, skip_update_check: bool) -> Self {
        let uv_name = if cfg!(windows) { "uv.exe" } else { "uv" };
        Config {
            repo_path: data_dir.join("cngt"),
            venv_dir: data_dir.join("venv"),
            uv_path: data_dir.join("bin").join(uv_name),
            update_marker: data_dir.join("last_update_check"),
            skip_update_check,
            data_dir,
        }
    }
}

/// Pick the base data directory for `platform` from environment lookups.
///
/// Empty and relative values are skipped so the result is always absolute.
pub fn base_dir<F>(platform: Platform, env: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| {
        env(key)
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
    };

    match platform {
        Platform::Windows => var("APPDATA").or_else(|| var("USERPROFILE")),
        Platform::MacOs => var("HOME").map(|h| h.join("Library").join("Application Support")),
        Platform::Other => {
            var("XDG_DATA_HOME").or_else(|| var("HOME").map(|h| h.join(".local").join("share")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // Serialize env-var tests to prevent interference between parallel test threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[cfg(unix)]
    #[test]
    fn xdg_data_home_preferred() {
        let env = env_of(&[("XDG_DATA_HOME", "/xdg"), ("HOME", "/home/u")]);
        assert_eq!(base_dir(Platform::Other, env), Some(PathBuf::from("/xdg")));
    }

    #[cfg(unix)]
    #[test]
    fn falls_back_to_home_local_share() {
        let env = env_of(&[("HOME", "/home/u")]);
        assert_eq!(
            base_dir(Platform::Other, env),
            Some(PathBuf::from("/home/u/.local/share"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn relative_xdg_is_ignored() {
        let env = env_of(&[("XDG_DATA_HOME", "relative/dir"), ("HOME", "/home/u")]);
        assert_eq!(
            base_dir(Platform::Other, env),
            Some(PathBuf::from("/home/u/.local/share"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn macos_uses_application_support() {
        let env = env_of(&[("HOME", "/Users/u")]);
        assert_eq!(
            base_dir(Platform::MacOs, env),
            Some(PathBuf::from("/Users/u/Library/Application Support"))
        );
    }

    #[cfg(windows)]
    #[test]
    fn windows_falls_back_to_user_profile() {
        let env = env_of(&[("USERPROFILE", r"C:\Users\u")]);
        assert_eq!(
            base_dir(Platform::Windows, env),
            Some(PathBuf::from(r"C:\Users\u"))
        );
    }

    #[test]
    fn nothing_set_yields_none() {
        let env = env_of(&[]);
        assert_eq!(base_dir(Platform::Windows, &env), None);
        assert_eq!(base_dir(Platform::MacOs, &env), None);
        assert_eq!(base_dir(Platform::Other, &env), None);
    }

    #[test]
    fn load_creates_absolute_data_dir() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("data");
        std::env::set_var("CNGT_DATA_DIR", &target);
        let first = load().unwrap();
        let second = load().unwrap();
        std::env::remove_var("CNGT_DATA_DIR");

        assert!(first.data_dir.is_absolute());
        assert!(first.data_dir.is_dir());
        assert_eq!(first.data_dir, second.data_dir);
        assert_eq!(first.repo_path, target.join("cngt"));
        assert_eq!(first.update_marker, target.join("last_update_check"));
    }

    #[test]
    fn load_without_override_ends_with_app_dir() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("CNGT_DATA_DIR");
        if let Ok(config) = load() {
            assert!(config.data_dir.is_absolute());
            assert!(config.data_dir.ends_with(APP_DIR));
            assert!(config.data_dir.exists());
        }
    }

    #[test]
    fn skip_update_check_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("CNGT_DATA_DIR", dir.path());
        std::env::set_var("CNGT_NO_UPDATE_CHECK", "1");
        let config = load().unwrap();
        std::env::remove_var("CNGT_NO_UPDATE_CHECK");
        std::env::remove_var("CNGT_DATA_DIR");
        assert!(config.skip_update_check);
    }
}
