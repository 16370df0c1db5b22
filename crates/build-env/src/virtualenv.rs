//! Virtual environment provisioning.
//!
//! Provisioning runs `virtualenv` with the environment's current (system)
//! interpreter, targeting the environment's root, then repoints the
//! environment at the interpreter inside the new root. The virtualenv
//! package itself is installed into the system interpreter on demand.
//!
//! An environment is provisioned at most once. Create a new
//! [`Environment`] for every additional virtual environment:
//!
//! ```ignore
//! let mut env = Environment::from_settings("pybuildenv", &settings).await?;
//! let python = virtualenv::provision(&mut env, &ProvisionOptions::default()).await?;
//! ```

use std::path::PathBuf;

use build_launch::process::quote_arg;
use build_launch::FlagSet;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::{EnvError, EnvResult};
use crate::pip::{self, Package};
use crate::platform;
use crate::progress::EnvProgressPhase;

/// Package providing the virtual-environment tool.
pub const VIRTUALENV_PACKAGE: &str = "virtualenv";

/// Options for [`provision`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionOptions {
    /// Version constraint for virtualenv if it has to be installed.
    pub version: Option<String>,
    /// Install virtualenv with `--user`.
    pub user: bool,
    /// Remove an existing root before creating the environment.
    pub clean: bool,
}

/// Create the virtual environment for `env` and switch it to the new
/// interpreter. Returns the new interpreter path.
pub async fn provision(env: &mut Environment, options: &ProvisionOptions) -> EnvResult<PathBuf> {
    let progress = env.progress().clone();
    progress.on_progress(
        env.name(),
        EnvProgressPhase::Starting {
            env_name: env.name().to_string(),
        },
    );

    let result = create(env, options).await;
    match &result {
        Ok(python) => progress.on_progress(
            env.name(),
            EnvProgressPhase::Ready {
                env_path: env.root().to_string_lossy().to_string(),
                python_path: python.to_string_lossy().to_string(),
            },
        ),
        Err(e) => progress.on_progress(
            env.name(),
            EnvProgressPhase::Error {
                message: e.to_string(),
            },
        ),
    }
    result
}

async fn create(env: &mut Environment, options: &ProvisionOptions) -> EnvResult<PathBuf> {
    let progress = env.progress().clone();

    let package = Package {
        name: VIRTUALENV_PACKAGE.to_string(),
        version: options.version.clone(),
    };
    let install_options = FlagSet::new().switch("user", options.user);
    if env.dependency_exists(VIRTUALENV_PACKAGE).await?.is_none() {
        progress.on_progress(
            env.name(),
            EnvProgressPhase::InstallingTool {
                package: package.to_string(),
            },
        );
        pip::install(env, std::slice::from_ref(&package), &install_options).await?;
    }

    if options.clean && env.root().exists() {
        progress.on_progress(
            env.name(),
            EnvProgressPhase::Cleaning {
                env_path: env.root().to_string_lossy().to_string(),
            },
        );
        platform::remove_directory(env.root());
    }

    progress.on_progress(env.name(), EnvProgressPhase::CreatingVenv);
    let args = format!(
        "-m {} {}",
        VIRTUALENV_PACKAGE,
        quote_arg(&env.root().to_string_lossy())
    );
    let code = env.run_python(args).await?;
    if code != 0 {
        return Err(EnvError::CreationFailed {
            name: env.name().to_string(),
            code,
        });
    }

    env.resolve_interpreter()
}
