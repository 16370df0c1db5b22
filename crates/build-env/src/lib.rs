//! Isolated Python build environments.
//!
//! This crate drives a build from start to finish on top of
//! [`build_launch`]:
//!
//! - An [`Environment`] owning a root directory that is deleted when the
//!   environment is dropped
//! - Provisioning of a virtual environment in that root with `virtualenv`
//! - pip operations (install, uninstall, upgrade, list, freeze, wipe)
//! - Drivers for pdoc, PyInstaller, and `git clone`
//!
//! # Progress Reporting
//!
//! Lifecycle operations report [`EnvProgressPhase`] events to the
//! environment's [`ProgressHandler`]. The default [`LogHandler`] writes them
//! to the log.
//!
//! ```ignore
//! use build_env::{pip, virtualenv, Environment, ProvisionOptions, Settings};
//!
//! let settings = build_env::load_settings();
//! let mut env = Environment::from_settings("pybuildenv", &settings).await?;
//! virtualenv::provision(&mut env, &ProvisionOptions::default()).await?;
//! pip::install(&env, &["requests==2.31.0".into()], &Default::default()).await?;
//! ```

pub mod docs;
pub mod environment;
pub mod error;
pub mod git;
pub mod packager;
pub mod pip;
pub mod platform;
pub mod progress;
pub mod requirements;
pub mod settings;
pub mod url;
pub mod virtualenv;

// Re-export key types
pub use docs::DocOptions;
pub use environment::{interpreter_info, Environment, InterpreterInfo, InterpreterState};
pub use error::{EnvError, EnvResult};
pub use git::CloneOptions;
pub use pip::{InstalledPackage, Package};
pub use platform::Platform;
pub use progress::{EnvProgressPhase, LogHandler, NullHandler, ProgressHandler};
pub use settings::{load_settings, load_settings_from, settings_path, Settings};
pub use url::validate_url;
pub use virtualenv::ProvisionOptions;
