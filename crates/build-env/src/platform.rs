//! Operating-system specifics: supported platforms, the on-disk layout of a
//! virtual environment, and directory helpers.

use std::fmt;
use std::path::{Path, PathBuf};

use log::error;

use crate::error::{EnvError, EnvResult};

/// Operating systems pybuild knows how to lay out environments for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Linux => write!(f, "linux"),
            Platform::MacOs => write!(f, "macos"),
        }
    }
}

impl Platform {
    /// The platform this process is running on.
    pub fn current() -> EnvResult<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS name as reported by `std::env::consts::OS`.
    pub fn from_os(os: &str) -> EnvResult<Self> {
        match os {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            other => Err(EnvError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn is_windows(self) -> bool {
        self == Platform::Windows
    }

    /// Directory holding the environment's executables, relative to its root.
    pub fn executables_dir(self) -> &'static str {
        match self {
            Platform::Windows => "Scripts",
            Platform::Linux | Platform::MacOs => "bin",
        }
    }

    /// Library directory components relative to the root. `python*` stands
    /// for the versioned `pythonX.Y` directory.
    pub fn libs_dir(self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &["Libs"],
            Platform::Linux | Platform::MacOs => &["lib", "python*"],
        }
    }

    /// File name of the interpreter executable.
    pub fn interpreter_name(self) -> &'static str {
        match self {
            Platform::Windows => "python.exe",
            Platform::Linux | Platform::MacOs => "python",
        }
    }

    /// Where a freshly created environment keeps its interpreter.
    pub fn known_interpreter_location(self, root: &Path) -> PathBuf {
        match self {
            Platform::Windows => root.join(self.interpreter_name()),
            Platform::Linux | Platform::MacOs => {
                root.join(self.executables_dir()).join(self.interpreter_name())
            }
        }
    }
}

/// List the entries of `root/targets...`, sorted.
///
/// A target component may contain a single `*` wildcard, which is matched
/// against the entries of the directory built so far (first match wins).
/// Any component containing `..` is rejected before the filesystem is
/// touched.
pub fn retrieve_directory_listing(root: &Path, targets: &[&str]) -> EnvResult<Vec<PathBuf>> {
    if let Some(bad) = targets.iter().find(|t| t.contains("..")) {
        return Err(EnvError::PathTraversal(bad.to_string()));
    }
    if !root.exists() {
        return Err(EnvError::NotFound(root.to_path_buf()));
    }

    let mut path = root.to_path_buf();
    for target in targets {
        path = if target.contains('*') {
            match_component(&path, target)?
        } else {
            path.join(target)
        };
    }
    if !path.is_dir() {
        return Err(EnvError::NotFound(path));
    }

    let mut entries = std::fs::read_dir(&path)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

fn match_component(dir: &Path, pattern: &str) -> EnvResult<PathBuf> {
    let pattern = pattern.trim_end_matches(['/', '\\']);
    let missing = || EnvError::NotFound(dir.join(pattern));
    if !dir.is_dir() {
        return Err(missing());
    }

    let mut names = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| wildcard_match(pattern, name))
        .collect::<Vec<_>>();
    names.sort();
    names.first().map(|name| dir.join(name)).ok_or_else(missing)
}

/// Match `name` against `pattern` where `*` matches any run of characters.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // No wildcard at all.
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

/// Recursively delete a directory, best-effort.
///
/// A missing directory is not an error. Other failures (a file locked by
/// another process, permissions) are logged and reported as `false`; the
/// directory may then remain partially on disk.
pub fn remove_directory(path: &Path) -> bool {
    match std::fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            error!("[env] Failed to remove {:?}: {}", path, e);
            false
        }
    }
}

/// Whether `path` is a file the current user may execute.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Whether `path` is a file the current user may execute.
#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Depth-first search of `root` for the first executable file named `name`.
pub fn find_executable(root: &Path, name: &str) -> Option<PathBuf> {
    let mut entries = std::fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    entries.sort();

    for path in &entries {
        if path.file_name().is_some_and(|n| n == name) && is_executable(path) {
            return Some(path.clone());
        }
    }
    entries
        .iter()
        .filter(|path| path.is_dir())
        .find_map(|dir| find_executable(dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_os() {
        assert_eq!(Platform::from_os("linux").unwrap(), Platform::Linux);
        assert_eq!(Platform::from_os("macos").unwrap(), Platform::MacOs);
        assert_eq!(Platform::from_os("windows").unwrap(), Platform::Windows);
        assert!(matches!(
            Platform::from_os("freebsd"),
            Err(EnvError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_known_interpreter_location() {
        let root = Path::new("env");
        assert_eq!(
            Platform::Linux.known_interpreter_location(root),
            Path::new("env").join("bin").join("python")
        );
        assert_eq!(
            Platform::Windows.known_interpreter_location(root),
            Path::new("env").join("python.exe")
        );
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("python*", "python3.11"));
        assert!(wildcard_match("python*", "python"));
        assert!(!wildcard_match("python*", "site-packages"));
        assert!(wildcard_match("*.exe", "python.exe"));
        assert!(wildcard_match("py*on*", "python3"));
        assert!(wildcard_match("lib", "lib"));
        assert!(!wildcard_match("lib", "lib64"));
        assert!(!wildcard_match("a*a", "a"));
    }

    #[test]
    fn test_listing_rejects_traversal_before_touching_disk() {
        let root = Path::new("/nonexistent/pybuild/root");
        for target in ["..", "../etc", "bin/.."] {
            let err = retrieve_directory_listing(root, &[target]).unwrap_err();
            assert!(matches!(err, EnvError::PathTraversal(_)), "{target}");
        }
    }

    #[test]
    fn test_listing_missing_root_and_subdir() {
        let temp = TempDir::new().unwrap();
        let missing_root = temp.path().join("absent");
        assert!(retrieve_directory_listing(&missing_root, &["bin"])
            .unwrap_err()
            .is_not_found());
        assert!(retrieve_directory_listing(temp.path(), &["bin"])
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_listing_with_wildcard_component() {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("lib").join("python3.12").join("site-packages");
        std::fs::create_dir_all(&site).unwrap();
        std::fs::write(temp.path().join("lib").join("python3.12").join("os.py"), "").unwrap();

        let listing = retrieve_directory_listing(temp.path(), &["lib", "python*/"]).unwrap();
        let names: Vec<_> = listing
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["os.py", "site-packages"]);
    }

    #[test]
    fn test_remove_directory_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("env");
        std::fs::create_dir_all(dir.join("bin")).unwrap();
        assert!(remove_directory(&dir));
        assert!(!dir.exists());
        assert!(remove_directory(&dir));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_skips_non_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let plain = temp.path().join("a").join("python.exe");
        let exec = temp.path().join("b").join("python.exe");
        std::fs::create_dir_all(plain.parent().unwrap()).unwrap();
        std::fs::create_dir_all(exec.parent().unwrap()).unwrap();
        std::fs::write(&plain, "").unwrap();
        std::fs::write(&exec, "").unwrap();
        std::fs::set_permissions(&exec, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(find_executable(temp.path(), "python.exe"), Some(exec));
        assert_eq!(find_executable(temp.path(), "missing"), None);
    }
}
