use crate::SvnError;

use std::path::{Path, PathBuf};

/// Name of the administrative directory at the root of a working copy.
pub(crate) const ADM_DIR: &str = ".svn";

/// Returns `path` itself if it exists, otherwise its nearest existing
/// ancestor.
///
/// A relative path ends in the current directory, returned as `.`.
pub fn correct_up_to_existing_parent(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .map(|candidate| {
            if candidate.as_os_str().is_empty() {
                Path::new(".")
            } else {
                candidate
            }
        })
        .find(|candidate| candidate.exists())
        .map(Path::to_path_buf)
}

/// Returns the directory a command about `target` runs in.
///
/// That is `target` if it is a directory, otherwise its parent, corrected up
/// to the nearest existing ancestor (the target may not exist yet, for
/// example before an `add`).
pub fn base_directory_for(target: &Path) -> Result<PathBuf, SvnError> {
    let start = if target.is_dir() {
        target
    } else {
        target.parent().unwrap_or(target)
    };
    correct_up_to_existing_parent(start).ok_or_else(|| {
        SvnError::InvalidPath(format!(
            "no existing directory above {}",
            target.display()
        ))
    })
}

/// Returns the working-copy root containing `dir`: the nearest ancestor
/// (including `dir`) that has a `.svn` directory.
///
/// A relative `dir` is resolved against the current directory first, so the
/// search can climb above it.
pub fn find_wc_root(dir: &Path) -> Option<PathBuf> {
    let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
    dir.ancestors()
        .find(|candidate| candidate.join(ADM_DIR).is_dir())
        .map(Path::to_path_buf)
}
