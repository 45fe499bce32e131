//! Path validation: keeps filesystem access inside the open workspace root.
//!
//! Paths coming from model output are always interpreted relative to the
//! root. Traversal out of the root and access to forbidden entries
//! (e.g. `.git`, `.env`) are rejected before any I/O happens.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' escapes the workspace root")]
    OutsideRoot { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Normalize a workspace-relative path into `/`-separated components.
///
/// Leading `/` and `./` are ignored, so `"/src/a.ts"`, `"./src/a.ts"` and
/// `"src/a.ts"` all name the same entry. An empty result is the root.
pub fn normalize(path: &str) -> Result<Vec<String>, PathValidationError> {
    let unified = path.replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathValidationError::PathTraversal { path: path.into() });
            }
        }
    }
    Ok(parts)
}

/// Check normalized components against the forbidden list.
///
/// A pattern matches when it is a component-wise prefix of the path
/// (`.git` blocks `.git/config` but not `.github/ci.yml`). Comparison is
/// case-insensitive.
pub fn check_forbidden(
    path: &str,
    parts: &[String],
    forbidden_paths: &[String],
) -> Result<(), PathValidationError> {
    for pattern in forbidden_paths {
        let Ok(pattern_parts) = normalize(pattern) else {
            continue;
        };
        if pattern_parts.is_empty() || pattern_parts.len() > parts.len() {
            continue;
        }
        let matches = pattern_parts
            .iter()
            .zip(parts)
            .all(|(p, c)| p.eq_ignore_ascii_case(c));
        if matches {
            return Err(PathValidationError::ForbiddenPath {
                path: path.into(),
                pattern: pattern.clone(),
            });
        }
    }
    Ok(())
}

/// Resolve `path` inside `root`.
///
/// Checks:
/// 1. No traversal components (`..`)
/// 2. Not in the forbidden list
/// 3. After resolving symlinks, the target (or, when it does not exist
///    yet, its nearest existing ancestor) still lives under `root`
///
/// `root` must already be canonical. Returns the absolute path.
pub fn resolve_in_root(
    root: &Path,
    path: &str,
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let parts = normalize(path)?;
    check_forbidden(path, &parts, forbidden_paths)?;

    let joined = parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p));

    // Missing components (e.g. for writes) are checked through their
    // nearest existing ancestor. A dangling symlink counts as existing and
    // fails to canonicalize.
    let Some(probe) = joined.ancestors().find(|p| p.symlink_metadata().is_ok()) else {
        return Err(PathValidationError::OutsideRoot { path: path.into() });
    };
    let canonical = probe
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: path.into(),
            reason: e.to_string(),
        })?;
    if !canonical.starts_with(root) {
        return Err(PathValidationError::OutsideRoot { path: path.into() });
    }

    Ok(joined)
}
