//! Path containment checks.
//!
//! # Responsibilities
//! - Resolve a request path against a configured root directory
//! - Reject directory traversal before any filesystem access
//!
//! # Design Decisions
//! - One canonicalizing check shared by static serving, CGI script
//!   resolution, uploads, and deletes — never a per-handler prefix test
//! - Lexical `..` resolution first, then canonicalization of existing
//!   targets so symlinks cannot escape the root either

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Why a target path was refused.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path escapes the configured root")]
    Traversal,

    #[error("root directory unavailable: {0}")]
    Root(std::io::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Resolve `rel` inside `root`, refusing any result outside it.
///
/// The returned path may not exist; callers decide whether that is an error.
pub fn resolve_within_root(root: &Path, rel: &str) -> Result<PathBuf, PathError> {
    let root = root.canonicalize().map_err(PathError::Root)?;

    let mut resolved = root.clone();
    for component in Path::new(rel.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                if !resolved.pop() || !resolved.starts_with(&root) {
                    return Err(PathError::Traversal);
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Traversal);
            }
        }
    }

    if !resolved.starts_with(&root) {
        return Err(PathError::Traversal);
    }

    // Existing targets are canonicalized so a symlink inside the root cannot
    // point the handler outside it.
    if resolved.exists() {
        let canonical = resolved.canonicalize()?;
        if !canonical.starts_with(&root) {
            return Err(PathError::Traversal);
        }
        return Ok(canonical);
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_path_resolves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let p = resolve_within_root(dir.path(), "/a.txt").unwrap();
        assert!(p.ends_with("a.txt"));
    }

    #[test]
    fn missing_target_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let p = resolve_within_root(dir.path(), "/sub/missing.txt").unwrap();
        assert!(p.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn dotdot_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_within_root(dir.path(), "/../etc/passwd"),
            Err(PathError::Traversal)
        ));
        assert!(matches!(
            resolve_within_root(dir.path(), "/a/../../etc/passwd"),
            Err(PathError::Traversal)
        ));
    }

    #[test]
    fn internal_dotdot_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let p = resolve_within_root(dir.path(), "/sub/../a.txt").unwrap();
        assert!(p.ends_with("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_rejected() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"x").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), dir.path().join("link"))
            .unwrap();
        assert!(matches!(
            resolve_within_root(dir.path(), "/link"),
            Err(PathError::Traversal)
        ));
    }
}
