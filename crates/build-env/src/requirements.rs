//! Processing of `pip freeze` output before a full wipe.
//!
//! Editable installs show up in freeze output as a `# Editable install ...`
//! comment followed by the requirement it describes. Such packages are
//! linked from a local checkout and cannot be uninstalled by name, so both
//! lines are dropped.

use std::path::Path;

use crate::error::{EnvError, EnvResult};

/// Marker pip writes above every editable requirement.
pub const EDITABLE_MARKER: &str = "# Editable install";

/// Drop every line containing [`EDITABLE_MARKER`] together with the line
/// that follows it.
pub fn strip_editable_installs(contents: &str) -> String {
    let mut kept = String::with_capacity(contents.len());
    let mut lines = contents.lines();
    while let Some(line) = lines.next() {
        if line.contains(EDITABLE_MARKER) {
            lines.next();
            continue;
        }
        kept.push_str(line);
        kept.push('\n');
    }
    kept
}

/// Number of actual requirement lines (not blank, not comments).
pub fn count_requirements(contents: &str) -> usize {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .count()
}

/// Rewrite the requirements file at `path` without editable installs.
///
/// Returns the number of requirements left in the file.
pub fn process_requirements(path: &Path) -> EnvResult<usize> {
    if !path.exists() {
        return Err(EnvError::NotFound(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    let stripped = strip_editable_installs(&contents);
    std::fs::write(path, &stripped)?;
    Ok(count_requirements(&stripped))
}
