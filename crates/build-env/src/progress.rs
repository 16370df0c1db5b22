//! Progress reporting for environment operations.
//!
//! Provides [`EnvProgressPhase`] events covering the lifecycle of an
//! environment (tool install, creation, teardown) and a [`ProgressHandler`]
//! trait that consumers implement to route events to their UI layer.

use serde::{Deserialize, Serialize};

/// Progress phases of an environment's lifecycle.
///
/// Serializable so front ends can emit them as JSON lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum EnvProgressPhase {
    /// Starting provisioning of the named environment.
    Starting { env_name: String },
    /// Installing a tool the operation depends on.
    InstallingTool { package: String },
    /// Removing a stale environment root before re-creating it.
    Cleaning { env_path: String },
    /// Running the virtual-environment tool.
    CreatingVenv,
    /// Environment is ready; the interpreter now points inside it.
    Ready {
        env_path: String,
        python_path: String,
    },
    /// Deleting the environment root.
    TearingDown { env_path: String },
    /// An error occurred.
    Error { message: String },
}

/// Trait for receiving environment progress events.
pub trait ProgressHandler: Send + Sync {
    /// Called for each progress phase. `env_name` is the environment's
    /// logical name.
    fn on_progress(&self, env_name: &str, phase: EnvProgressPhase);
}

/// Log-only progress handler.
///
/// Writes progress phases to the `log` crate at info level (errors at error
/// level).
pub struct LogHandler;

impl ProgressHandler for LogHandler {
    fn on_progress(&self, env_name: &str, phase: EnvProgressPhase) {
        match &phase {
            EnvProgressPhase::Starting { .. } => {
                log::info!("[{env_name}] Provisioning virtual environment");
            }
            EnvProgressPhase::InstallingTool { package } => {
                log::info!("[{env_name}] Installing {package}");
            }
            EnvProgressPhase::Cleaning { env_path } => {
                log::info!("[{env_name}] Removing existing environment at {env_path}");
            }
            EnvProgressPhase::CreatingVenv => {
                log::info!("[{env_name}] Creating virtual environment");
            }
            EnvProgressPhase::Ready {
                env_path,
                python_path,
            } => {
                log::info!("[{env_name}] Ready at {env_path} (python: {python_path})");
            }
            EnvProgressPhase::TearingDown { env_path } => {
                log::info!("[{env_name}] Removing environment at {env_path}");
            }
            EnvProgressPhase::Error { message } => {
                log::error!("[{env_name}] {message}");
            }
        }
    }
}

/// Handler that discards every event.
pub struct NullHandler;

impl ProgressHandler for NullHandler {
    fn on_progress(&self, _env_name: &str, _phase: EnvProgressPhase) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_with_tag() {
        let json = serde_json::to_value(EnvProgressPhase::Ready {
            env_path: "e1".into(),
            python_path: "e1/bin/python".into(),
        })
        .unwrap();
        assert_eq!(json["phase"], "ready");
        assert_eq!(json["python_path"], "e1/bin/python");

        let json = serde_json::to_value(EnvProgressPhase::CreatingVenv).unwrap();
        assert_eq!(json, serde_json::json!({ "phase": "creating_venv" }));
    }

    #[test]
    fn test_phase_round_trips() {
        let phase: EnvProgressPhase =
            serde_json::from_str(r#"{"phase":"installing_tool","package":"virtualenv"}"#).unwrap();
        assert_eq!(
            phase,
            EnvProgressPhase::InstallingTool {
                package: "virtualenv".into()
            }
        );
    }
}
