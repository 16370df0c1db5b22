//! User settings for pybuild.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/pybuild/settings.json
//! - Linux: ~/.config/pybuild/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\pybuild\settings.json
//!
//! Every field is optional; a missing or unreadable file yields defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use build_launch::{LogSink, OutputSink, ProcessRunner};
use log::warn;
use serde::{Deserialize, Serialize};

/// pybuild settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// System interpreter used before an environment is provisioned.
    /// Looked up on PATH when unset.
    pub python: Option<PathBuf>,

    /// git binary used for source fetches. Looked up on PATH when unset.
    pub git: Option<PathBuf>,

    /// Forward tool output to the log.
    pub forward_output: bool,

    /// Extra environment variables for every launched tool.
    pub env: BTreeMap<String, String>,

    /// Directory environment roots are created in. Defaults to the current
    /// directory.
    pub base_dir: Option<PathBuf>,

    /// Version constraint for the virtualenv package installed on demand.
    pub virtualenv_version: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            python: None,
            git: None,
            forward_output: true,
            env: BTreeMap::new(),
            base_dir: None,
            virtualenv_version: None,
        }
    }
}

impl Settings {
    /// Build a process runner carrying these settings' environment variables
    /// and the default log sink.
    pub fn runner(&self) -> ProcessRunner {
        self.runner_with_sink(Arc::new(LogSink))
    }

    pub fn runner_with_sink(&self, sink: Arc<dyn OutputSink>) -> ProcessRunner {
        self.env
            .iter()
            .fold(ProcessRunner::new(sink), |runner, (k, v)| {
                runner.with_env(k.clone(), v.clone())
            })
    }

    /// Directory environment roots are created in.
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Get the path to the settings file.
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pybuild")
        .join("settings.json")
}

/// Load settings from the default location.
pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or invalid.
pub fn load_settings_from(path: &Path) -> Settings {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Settings::default(),
    };
    match serde_json::from_str(&contents) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("[settings] Ignoring invalid settings at {:?}: {}", path, e);
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = load_settings_from(&temp.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert!(settings.forward_output);
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings_from(&path), Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, r#"{"python": "/opt/python/bin/python3", "env": {"PIP_NO_INPUT": "1"}}"#)
            .unwrap();

        let settings = load_settings_from(&path);
        assert_eq!(settings.python, Some(PathBuf::from("/opt/python/bin/python3")));
        assert_eq!(settings.env.get("PIP_NO_INPUT").map(String::as_str), Some("1"));
        assert!(settings.forward_output);
        assert_eq!(settings.base_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_serialized_settings_load_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        let settings = Settings {
            forward_output: false,
            virtualenv_version: Some(">=20".into()),
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
        assert_eq!(load_settings_from(&path), settings);
    }
}
