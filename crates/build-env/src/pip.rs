//! pip operations against an environment's active interpreter.
//!
//! Each operation renders a `python -m pip ...` command line from packages
//! and a [`FlagSet`] and runs it through the environment's process runner.
//! A non-zero exit code is reported as an error named after the operation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use build_launch::process::quote_arg;
use build_launch::{FlagSet, LineCallback, OutputStream};
use log::info;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::{EnvError, EnvResult};

/// Characters that mark a version string as a full constraint rather than
/// an exact version.
const CONSTRAINT_OPERATORS: &[char] = &['=', '<', '>', '!', '~'];

/// A package name with an optional version constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// `version` is either an exact version (`1.0`) or a constraint
    /// carrying its operator (`>=1.0`).
    pub fn with_version(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version.as_deref() {
            Some(v) if v.contains(CONSTRAINT_OPERATORS) => write!(f, "{}{}", self.name, v),
            Some(v) => write!(f, "{}=={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A requirement string such as `demo` or `demo==1.0`, used verbatim.
impl From<&str> for Package {
    fn from(requirement: &str) -> Self {
        Self::new(requirement)
    }
}

impl From<String> for Package {
    fn from(requirement: String) -> Self {
        Self::new(requirement)
    }
}

/// A package as reported by `pip list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

fn describe(packages: &[Package]) -> String {
    if packages.is_empty() {
        "requirements".to_string()
    } else {
        packages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn pip_args(subcommand: &str, packages: &[Package], options: &FlagSet) -> String {
    let mut parts = vec!["-m pip".to_string(), subcommand.to_string()];
    parts.extend(packages.iter().map(|p| quote_arg(&p.to_string())));
    if !options.is_empty() {
        parts.push(options.render());
    }
    parts.join(" ")
}

/// Install `packages` in the order given.
pub async fn install(
    env: &Environment,
    packages: &[Package],
    options: &FlagSet,
) -> EnvResult<i32> {
    let code = env.run_python(pip_args("install", packages, options)).await?;
    if code != 0 {
        return Err(EnvError::InstallFailed {
            packages: describe(packages),
            code,
        });
    }
    info!("[pip] Successfully installed {}", describe(packages));
    Ok(code)
}

/// Install `package` only when it is not already present.
///
/// Returns whether an install happened.
pub async fn ensure_installed(
    env: &Environment,
    package: &Package,
    options: &FlagSet,
) -> EnvResult<bool> {
    if env.dependency_exists(&package.name).await?.is_some() {
        return Ok(false);
    }
    install(env, std::slice::from_ref(package), options).await?;
    Ok(true)
}

/// Uninstall `packages` without prompting.
pub async fn uninstall(
    env: &Environment,
    packages: &[Package],
    options: &FlagSet,
) -> EnvResult<i32> {
    let code = env
        .run_python(pip_args("uninstall -y", packages, options))
        .await?;
    if code != 0 {
        return Err(EnvError::UninstallFailed {
            packages: describe(packages),
            code,
        });
    }
    info!("[pip] Successfully uninstalled {}", describe(packages));
    Ok(code)
}

/// Upgrade `packages` to their latest versions.
pub async fn upgrade(env: &Environment, packages: &[Package]) -> EnvResult<i32> {
    let options = FlagSet::new().switch("upgrade", true);
    let code = env
        .run_python(pip_args("install", packages, &options))
        .await?;
    if code != 0 {
        return Err(EnvError::UpgradeFailed {
            packages: describe(packages),
            code,
        });
    }
    info!("[pip] Successfully upgraded {}", describe(packages));
    Ok(code)
}

/// Run `pip list` and return its stdout lines.
///
/// Output is always captured; `log_output` only controls whether it is also
/// forwarded to the log.
pub async fn list(env: &Environment, log_output: bool) -> EnvResult<Vec<String>> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let callback: LineCallback = Arc::new(move |stream, line| {
        if stream == OutputStream::Stdout {
            if let Ok(mut lines) = sink.lock() {
                lines.push(line.to_string());
            }
        }
    });

    let invocation = env
        .python_invocation(pip_args("list", &[], &FlagSet::new()))
        .forward_output(log_output && env.forward_output())
        .on_line(callback);
    let code = env.runner().run(invocation).await?;
    if code != 0 {
        return Err(EnvError::ListFailed { code });
    }

    let lines = captured.lock().map(|l| l.clone()).unwrap_or_default();
    Ok(lines)
}

/// Write `pip freeze` output to `file` and return its absolute path.
pub async fn freeze(env: &Environment, file: &Path) -> EnvResult<PathBuf> {
    let args = format!(
        "{} > {}",
        pip_args("freeze", &[], &FlagSet::new()),
        quote_arg(&file.to_string_lossy())
    );
    let code = env.run_python(args).await?;
    if code != 0 {
        return Err(EnvError::FreezeFailed { code });
    }

    let path = std::path::absolute(file)?;
    if !path.exists() {
        return Err(EnvError::NotFound(path));
    }
    info!("[pip] Froze {} into {:?}", env.name(), path);
    Ok(path)
}

/// Find `name` in `pip list` output.
///
/// Each line is `<name> <version>` separated by whitespace; the version is
/// the last token. Header lines never match a real package name.
pub fn parse_installed(lines: &[String], name: &str) -> Option<InstalledPackage> {
    lines.iter().find_map(|line| {
        let mut tokens = line.split_whitespace();
        let first = tokens.next()?;
        if first != name {
            return None;
        }
        let version = tokens.last().unwrap_or(first);
        Some(InstalledPackage {
            name: first.to_string(),
            version: version.to_string(),
        })
    })
}
