//! Lookup of external tools on `PATH`.
//!
//! pybuild never installs system tools itself. The interpreter and `git`
//! must already be available; this module finds them and caches the result
//! for the lifetime of the process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use tokio::sync::OnceCell;

/// Interpreter names probed on `PATH`, in order.
#[cfg(windows)]
pub const PYTHON_CANDIDATES: &[&str] = &["python"];
#[cfg(not(windows))]
pub const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

/// Errors from tool lookup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("{0} not found on PATH")]
    NotFound(String),

    #[error("Configured tool {0} does not exist")]
    MissingOverride(PathBuf),
}

/// Resolve an executable by name on `PATH`.
pub fn find_tool(name: &str) -> Result<PathBuf, ToolError> {
    which::which(name).map_err(|_| ToolError::NotFound(name.to_string()))
}

/// Resolve the system Python interpreter.
///
/// An explicit `override_path` wins when it exists. Otherwise the first of
/// [`PYTHON_CANDIDATES`] found on `PATH` is used.
pub fn find_python(override_path: Option<&Path>) -> Result<PathBuf, ToolError> {
    if let Some(path) = override_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        // A bare name like "python3.11" is looked up on PATH.
        if path.components().count() == 1 {
            return find_tool(&path.to_string_lossy());
        }
        return Err(ToolError::MissingOverride(path.to_path_buf()));
    }

    PYTHON_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| ToolError::NotFound(PYTHON_CANDIDATES.join(" or ")))
}

/// Global cache for the system interpreter path.
static PYTHON_PATH: OnceCell<Arc<Result<PathBuf, ToolError>>> = OnceCell::const_new();

/// Get the system interpreter from `PATH`, cached after the first lookup.
pub async fn get_python_path() -> Result<PathBuf, ToolError> {
    let result = PYTHON_PATH
        .get_or_init(|| async {
            let result = find_python(None);
            if let Ok(path) = &result {
                info!("Using system python at {:?}", path);
            }
            Arc::new(result)
        })
        .await;
    result.as_ref().clone()
}

/// Global cache for the git binary path.
static GIT_PATH: OnceCell<Arc<Result<PathBuf, ToolError>>> = OnceCell::const_new();

/// Get the path to git, cached after the first lookup.
pub async fn get_git_path() -> Result<PathBuf, ToolError> {
    let result = GIT_PATH
        .get_or_init(|| async {
            let result = find_tool("git");
            if let Ok(path) = &result {
                info!("Using git at {:?}", path);
            }
            Arc::new(result)
        })
        .await;
    result.as_ref().clone()
}
