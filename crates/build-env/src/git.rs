//! Source fetches with git.
//!
//! ```ignore
//! let git = build_launch::get_git_path().await?;
//! let options = CloneOptions { branch: Some("dev".into()), ..Default::default() };
//! git::clone(&runner, &git, "https://github.com/foobar/baz.git", &options).await?;
//! ```

use std::path::{Path, PathBuf};

use build_launch::process::quote_arg;
use build_launch::{Invocation, ProcessRunner};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::error::{EnvError, EnvResult};
use crate::url::validate_url;

/// Options for [`clone`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneOptions {
    /// Target directory. Derived from the URL when unset.
    pub destination: Option<PathBuf>,
    /// Branch to check out instead of the default.
    pub branch: Option<String>,
    /// Ask git to report progress.
    pub progress: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            destination: None,
            branch: None,
            progress: true,
        }
    }
}

/// Default clone directory for `url`: its last path segment without
/// extension (`https://host/foo/baz.git` -> `baz`).
pub fn default_destination(url: &str) -> Option<PathBuf> {
    Path::new(url.trim_end_matches('/'))
        .file_stem()
        .map(PathBuf::from)
}

fn clone_args(url: &str, destination: &Path, options: &CloneOptions) -> String {
    let mut args = format!(
        "clone {} {}",
        quote_arg(url),
        quote_arg(&destination.to_string_lossy())
    );
    if let Some(branch) = &options.branch {
        args.push_str(&format!(" -b {}", quote_arg(branch)));
    }
    if options.progress {
        args.push_str(" --progress");
    }
    args
}

/// Clone `url` and return the absolute path of the checkout.
///
/// An invalid URL is logged and yields `Ok(None)` without launching git.
pub async fn clone(
    runner: &ProcessRunner,
    git: &Path,
    url: &str,
    options: &CloneOptions,
) -> EnvResult<Option<PathBuf>> {
    if !validate_url(url) {
        error!("[git] Invalid URL detected: {:?}", url);
        return Ok(None);
    }

    let destination = options
        .destination
        .clone()
        .or_else(|| default_destination(url))
        .ok_or_else(|| EnvError::NotFound(PathBuf::from(url)))?;

    let code = runner
        .run(Invocation::new(git, clone_args(url, &destination, options)))
        .await?;
    if code != 0 {
        return Err(EnvError::CloneFailed {
            url: url.to_string(),
            code,
        });
    }

    let cloned = std::path::absolute(&destination)?;
    if !cloned.exists() {
        return Err(EnvError::NotFound(cloned));
    }
    info!("[git] Cloned {} into {:?}", url, cloned);
    Ok(Some(cloned))
}
