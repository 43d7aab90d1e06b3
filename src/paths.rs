//! Library path guard for caller-supplied destinations

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Join `relative` onto `root`, refusing anything that would leave `root`.
///
/// Resolution is lexical: `.` segments are dropped and `..` pops a previously
/// pushed segment. Absolute paths and `..` that climb above `root` are rejected
/// with [`Error::InvalidPath`]. Symlinks inside the library are trusted.
///
/// ```
/// use media_dl::paths::resolve_within;
/// use std::path::Path;
///
/// let root = Path::new("/srv/library");
/// assert_eq!(
///     resolve_within(root, "Shows/./Season 1").unwrap(),
///     root.join("Shows/Season 1")
/// );
/// assert!(resolve_within(root, "../etc").is_err());
/// ```
pub fn resolve_within(root: &Path, relative: impl AsRef<Path>) -> Result<PathBuf> {
    let relative = relative.as_ref();
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in relative.components() {
        match component {
            Component::Normal(segment) => parts.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(rejected(relative, "path escapes the library directory"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(rejected(relative, "absolute paths are not allowed"));
            }
        }
    }

    let resolved = parts
        .into_iter()
        .fold(root.to_path_buf(), |acc, part| acc.join(part));

    tracing::debug!(
        relative = %relative.display(),
        resolved = %resolved.display(),
        "Resolved library path"
    );
    Ok(resolved)
}

fn rejected(path: &Path, reason: &str) -> Error {
    tracing::warn!(path = %path.display(), reason, "Rejected path outside library");
    Error::InvalidPath {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
