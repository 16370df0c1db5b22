//! Executable packaging with PyInstaller.

use std::path::PathBuf;

use build_launch::Invocation;
use log::info;

use crate::environment::Environment;
use crate::error::{EnvError, EnvResult};
use crate::pip::{self, Package};
use crate::platform::Platform;

/// Package providing the executable packager.
pub const PACKAGER_PACKAGE: &str = "pyinstaller";

/// Find the packager's launcher among the environment's executables.
pub fn find_launcher(env: &Environment) -> EnvResult<PathBuf> {
    let launcher = env.executables()?.into_iter().find(|path| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_lowercase().contains(PACKAGER_PACKAGE))
            .unwrap_or(false)
    });
    match launcher {
        Some(path) => Ok(path),
        None => {
            let platform = Platform::current()?;
            Err(EnvError::NotFound(
                env.root()
                    .join(platform.executables_dir())
                    .join(PACKAGER_PACKAGE),
            ))
        }
    }
}

/// Run the packager with a raw argument string and return its exit code.
///
/// Installs the packager when missing. The caller decides whether a
/// non-zero exit code is a failure.
pub async fn make(env: &Environment, args: &str) -> EnvResult<i32> {
    pip::ensure_installed(env, &Package::new(PACKAGER_PACKAGE), &Default::default()).await?;
    let launcher = find_launcher(env)?;

    info!("[pyinstaller] Running {:?} {}", launcher, args);
    let invocation = Invocation::new(launcher, args).forward_output(env.forward_output());
    Ok(env.runner().run(invocation).await?)
}
