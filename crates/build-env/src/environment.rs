//! The build environment: one isolated interpreter context rooted on disk.
//!
//! An [`Environment`] starts out pointing at the system interpreter. The
//! provisioner ([`crate::virtualenv::provision`]) creates the root and then
//! repoints the environment at the interpreter inside it, exactly once.
//! Dropping the environment deletes its root, so scoped use cleans up on
//! every exit path:
//!
//! ```ignore
//! let mut env = Environment::from_settings("pybuildenv", &settings).await?;
//! virtualenv::provision(&mut env, &ProvisionOptions::default()).await?;
//! pip::install(&env, &["pyinstaller".into()], &FlagSet::new()).await?;
//! // root removed here
//! ```

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use build_launch::{FlagSet, Invocation, LineCallback, OutputStream, ProcessRunner};
use log::{debug, info};
use serde::Serialize;

use crate::error::{EnvError, EnvResult};
use crate::pip::{self, InstalledPackage};
use crate::platform::{self, Platform};
use crate::progress::{EnvProgressPhase, LogHandler, ProgressHandler};
use crate::requirements;
use crate::settings::Settings;

/// Which interpreter an environment currently runs its tools with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterState {
    /// Root not created yet; tools run with the system interpreter.
    Unprovisioned { system: PathBuf },
    /// Root created; tools run with the interpreter inside it.
    Provisioned { system: PathBuf, active: PathBuf },
}

impl InterpreterState {
    pub fn system(&self) -> &Path {
        match self {
            InterpreterState::Unprovisioned { system } => system,
            InterpreterState::Provisioned { system, .. } => system,
        }
    }

    pub fn active(&self) -> &Path {
        match self {
            InterpreterState::Unprovisioned { system } => system,
            InterpreterState::Provisioned { active, .. } => active,
        }
    }
}

/// Version and pointer width of an interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterpreterInfo {
    pub version: (u32, u32, u32),
    pub pointer_width: u32,
}

impl fmt::Display for InterpreterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor, micro) = self.version;
        write!(f, "{major}.{minor}.{micro} ({}-bit)", self.pointer_width)
    }
}

/// Prints `major minor micro bits`. Written without quotes or `%` so it
/// survives both `sh` and `cmd`.
const INFO_SCRIPT: &str =
    "import sys, struct; print(*sys.version_info[:3], struct.calcsize(chr(80)) * 8)";

/// One provisioned (or to-be-provisioned) interpreter context.
///
/// The root directory is exclusively owned by this instance and is deleted
/// when it is dropped.
pub struct Environment {
    name: String,
    root: PathBuf,
    state: InterpreterState,
    runner: ProcessRunner,
    progress: Arc<dyn ProgressHandler>,
    forward_output: bool,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Create an environment rooted at `./name`. Nothing is created on disk.
    pub fn new(
        name: impl Into<String>,
        runner: ProcessRunner,
        system_python: PathBuf,
    ) -> EnvResult<Self> {
        Self::in_dir(Path::new("."), name, runner, system_python)
    }

    /// Create an environment rooted at `base/name`.
    ///
    /// `name` must be a single plain path component; the root is deleted on
    /// drop, so `.`, `..`, absolute paths and nested paths are rejected.
    pub fn in_dir(
        base: &Path,
        name: impl Into<String>,
        runner: ProcessRunner,
        system_python: PathBuf,
    ) -> EnvResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        let root = if base == Path::new(".") {
            PathBuf::from(&name)
        } else {
            base.join(&name)
        };
        Ok(Self {
            name,
            root,
            state: InterpreterState::Unprovisioned {
                system: system_python,
            },
            runner,
            progress: Arc::new(LogHandler),
            forward_output: true,
        })
    }

    /// Create an environment from user settings, resolving the system
    /// interpreter from the settings or `PATH`.
    pub async fn from_settings(name: impl Into<String>, settings: &Settings) -> EnvResult<Self> {
        let python = match &settings.python {
            Some(path) => build_launch::find_python(Some(path))?,
            None => build_launch::get_python_path().await?,
        };
        Ok(
            Self::in_dir(&settings.base_dir(), name, settings.runner(), python)?
                .with_forward_output(settings.forward_output),
        )
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    /// Whether tool output is forwarded to the runner's sink.
    pub fn with_forward_output(mut self, forward: bool) -> Self {
        self.forward_output = forward;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The interpreter tools currently run with.
    pub fn python(&self) -> &Path {
        self.state.active()
    }

    pub fn system_python(&self) -> &Path {
        self.state.system()
    }

    pub fn state(&self) -> &InterpreterState {
        &self.state
    }

    pub fn is_provisioned(&self) -> bool {
        matches!(self.state, InterpreterState::Provisioned { .. })
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    pub fn progress(&self) -> &Arc<dyn ProgressHandler> {
        &self.progress
    }

    pub fn forward_output(&self) -> bool {
        self.forward_output
    }

    /// An invocation of the active interpreter with `args`.
    pub fn python_invocation(&self, args: impl Into<String>) -> Invocation {
        Invocation::new(self.python(), args).forward_output(self.forward_output)
    }

    /// Run the active interpreter with `args` and return its exit code.
    pub async fn run_python(&self, args: impl Into<String>) -> EnvResult<i32> {
        Ok(self.runner.run(self.python_invocation(args)).await?)
    }

    /// Repoint the environment at the interpreter inside its root.
    ///
    /// Only the first call after the root exists does any work; once
    /// provisioned, this returns the active interpreter unchanged. Use a new
    /// `Environment` for every fresh provisioning.
    pub fn resolve_interpreter(&mut self) -> EnvResult<PathBuf> {
        let system = match &self.state {
            InterpreterState::Provisioned { active, .. } => {
                debug!("[env] {} already provisioned at {:?}", self.name, active);
                return Ok(active.clone());
            }
            InterpreterState::Unprovisioned { system } => system.clone(),
        };

        let platform = Platform::current()?;
        let known = platform.known_interpreter_location(&self.root);
        let active = if known.exists() {
            known
        } else if platform.is_windows() {
            platform::find_executable(&self.root, platform.interpreter_name())
                .ok_or(EnvError::InterpreterMissing(known))?
        } else {
            return Err(EnvError::InterpreterMissing(known));
        };
        let active = std::path::absolute(&active)?;

        info!("[env] {} now using interpreter {:?}", self.name, active);
        self.state = InterpreterState::Provisioned {
            system,
            active: active.clone(),
        };
        Ok(active)
    }

    /// Delete the environment root if it exists.
    ///
    /// Best-effort: a missing root is fine and other failures are logged,
    /// never raised. Returns whether the root is gone afterwards.
    pub fn cleanup(&self) -> bool {
        if !self.root.exists() {
            return true;
        }
        self.progress.on_progress(
            &self.name,
            EnvProgressPhase::TearingDown {
                env_path: self.root.to_string_lossy().to_string(),
            },
        );
        platform::remove_directory(&self.root)
    }

    /// Look up an installed package by exact name.
    ///
    /// Returns `None` when the package is absent.
    pub async fn dependency_exists(&self, package: &str) -> EnvResult<Option<InstalledPackage>> {
        let lines = pip::list(self, false).await?;
        Ok(pip::parse_installed(&lines, package))
    }

    /// Files in the environment's executables directory.
    pub fn executables(&self) -> EnvResult<Vec<PathBuf>> {
        let platform = Platform::current()?;
        let listing =
            platform::retrieve_directory_listing(&self.root, &[platform.executables_dir()])?;
        Ok(listing.into_iter().filter(|p| p.is_file()).collect())
    }

    /// Entries of the environment's library directory.
    pub fn libs(&self) -> EnvResult<Vec<PathBuf>> {
        let platform = Platform::current()?;
        platform::retrieve_directory_listing(&self.root, platform.libs_dir())
    }

    /// Ask the active interpreter for its version and pointer width.
    pub async fn info(&self) -> EnvResult<InterpreterInfo> {
        interpreter_info(&self.runner, self.python()).await
    }

    /// Uninstall every package in the environment.
    ///
    /// The installed set is frozen into a temporary file, editable installs
    /// are stripped (they cannot be uninstalled by name), and the rest is
    /// uninstalled. The temporary file is always deleted. Returns the number
    /// of requirements that were uninstalled.
    pub async fn wipe(&self) -> EnvResult<usize> {
        let frozen = tempfile::Builder::new()
            .prefix("pybuild-freeze-")
            .suffix(".txt")
            .tempfile()?
            .into_temp_path();

        pip::freeze(self, &frozen).await?;
        let remaining = requirements::process_requirements(&frozen)?;
        if remaining > 0 {
            let options = FlagSet::new().value(
                "requirement",
                build_launch::process::quote_arg(&frozen.to_string_lossy()),
            );
            pip::uninstall(self, &[], &options).await?;
        }
        info!("[env] Wiped {} packages from {}", remaining, self.name);
        Ok(remaining)
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn validate_name(name: &str) -> EnvResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(EnvError::InvalidName(name.to_string())),
    }
}

/// Ask `python` for its version and pointer width without an environment.
pub async fn interpreter_info(runner: &ProcessRunner, python: &Path) -> EnvResult<InterpreterInfo> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let callback: LineCallback = Arc::new(move |stream, line| {
        if stream == OutputStream::Stdout {
            if let Ok(mut lines) = sink.lock() {
                lines.push(line.to_string());
            }
        }
    });

    let invocation = Invocation::new(python, format!("-c \"{INFO_SCRIPT}\""))
        .forward_output(false)
        .on_line(callback);
    let code = runner.run(invocation).await?;

    let query_error = |reason: String| EnvError::InterpreterQuery {
        interpreter: python.to_path_buf(),
        reason,
    };
    if code != 0 {
        return Err(query_error(format!("exit code {code}")));
    }
    let output = captured
        .lock()
        .map(|lines| lines.join("\n"))
        .unwrap_or_default();
    parse_info(&output).ok_or_else(|| query_error(format!("unexpected output {output:?}")))
}

fn parse_info(output: &str) -> Option<InterpreterInfo> {
    let numbers = output
        .split_whitespace()
        .map(|t| t.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match numbers.as_slice() {
        [major, minor, micro, bits] => Some(InterpreterInfo {
            version: (*major, *minor, *micro),
            pointer_width: *bits,
        }),
        _ => None,
    }
}
