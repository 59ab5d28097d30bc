use std::path::{Path, PathBuf};

use crate::errors::{LockwardError, LockwardResult};

/// Walk up from `start` looking for a file named `filename`.
/// Returns the path to the directory containing the file, or `None`.
pub fn find_ancestor_with(start: &Path, filename: &str) -> Option<PathBuf> {
    let mut current = start;
    loop {
        let candidate = current.join(filename);
        if candidate.is_file() {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

/// Read a whole file, naming it in the error when it cannot be read.
///
/// `what` is a short human label such as `"lockfile"` or `"manifest"`.
pub fn read_to_string(path: &Path, what: &str) -> LockwardResult<String> {
    tracing::trace!(path = %path.display(), "reading {what}");
    std::fs::read_to_string(path).map_err(|source| LockwardError::Read {
        what: what.to_string(),
        path: path.to_path_buf(),
        source,
    })
}
