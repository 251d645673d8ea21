//! Root confinement. Every path a caller supplies goes through
//! [`Workspace::resolve`] before anything touches the filesystem; there is
//! no other entry point.

use crate::error::{EngineError, Result};
use crate::workspace::Workspace;
use std::path::{Component, Path, PathBuf};

/// A caller path proven to lie within the project root.
///
/// Constructing one is the proof: resolution canonicalizes the path
/// (including symlink targets) and rejects anything that escapes the root,
/// so operations can trust `absolute()` unconditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: PathBuf,
}

impl ResolvedPath {
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Path relative to the project root; empty for the root itself.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Root-relative display form with forward slashes; `.` for the root.
    pub fn display(&self) -> String {
        if self.relative.as_os_str().is_empty() {
            ".".to_string()
        } else {
            self.relative.to_string_lossy().replace('\\', "/")
        }
    }

    pub fn exists(&self) -> bool {
        self.absolute.exists()
    }
}

impl Workspace {
    /// Validate a caller-supplied path against the project root.
    ///
    /// Relative paths are taken relative to the root. `.` and `..` are
    /// resolved lexically first, then the deepest existing ancestor is
    /// canonicalized (resolving symlinks) and the remainder re-applied, so
    /// not-yet-created targets can still be validated. The canonical result
    /// must equal the root or descend from it.
    pub fn resolve(&self, raw: impl AsRef<Path>) -> Result<ResolvedPath> {
        let root = self.root()?;
        let raw = raw.as_ref();

        let candidate = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            root.join(raw)
        };
        let normalized = lexical_normalize(&candidate);
        let canonical = canonicalize_deepest_ancestor(&normalized)?;

        if canonical != root && !canonical.starts_with(&root) {
            return Err(EngineError::OutsideRoot {
                path: raw.display().to_string(),
            });
        }

        let relative = canonical
            .strip_prefix(&root)
            .unwrap_or_else(|_| Path::new(""))
            .to_path_buf();
        Ok(ResolvedPath {
            absolute: canonical,
            relative,
        })
    }

    /// Like [`Workspace::resolve`], failing with `NotFound` when the target
    /// does not exist.
    pub fn resolve_existing(&self, raw: impl AsRef<Path>) -> Result<ResolvedPath> {
        let resolved = self.resolve(&raw)?;
        if !resolved.exists() {
            return Err(EngineError::NotFound {
                path: raw.as_ref().display().to_string(),
            });
        }
        Ok(resolved)
    }
}

/// Resolve `.` and `..` without touching the filesystem. `..` at the top
/// simply stays at the top; the containment check afterwards rejects any
/// escape.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// non-existing remainder. Symlinks in the existing part are resolved; the
/// remainder cannot contain any.
fn canonicalize_deepest_ancestor(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();

    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
        if existing.as_os_str().is_empty() {
            break;
        }
    }

    let mut canonical = existing
        .canonicalize()
        .map_err(|e| EngineError::from_io(e, path))?;
    for name in tail.into_iter().rev() {
        canonical.push(name);
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let temp = tempdir().unwrap();
        let workspace = Workspace::with_root(temp.path(), EngineConfig::default()).unwrap();
        (temp, workspace)
    }

    #[test]
    fn resolves_relative_paths_inside_root() {
        let (temp, workspace) = workspace();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/main.rs"), b"fn main() {}").unwrap();

        let resolved = workspace.resolve("src/main.rs").unwrap();
        assert!(resolved.exists());
        assert_eq!(resolved.display(), "src/main.rs");
    }

    #[test]
    fn empty_path_is_the_root() {
        let (_temp, workspace) = workspace();
        let resolved = workspace.resolve("").unwrap();
        assert_eq!(resolved.absolute(), workspace.root().unwrap());
        assert_eq!(resolved.display(), ".");
    }

    #[test]
    fn rejects_dotdot_escape() {
        let (_temp, workspace) = workspace();
        let err = workspace.resolve("../outside.txt").unwrap_err();
        assert!(matches!(err, EngineError::OutsideRoot { .. }));

        let err = workspace.resolve("a/../../outside.txt").unwrap_err();
        assert!(matches!(err, EngineError::OutsideRoot { .. }));
    }

    #[test]
    fn rejects_absolute_path_outside_root() {
        let (_temp, workspace) = workspace();
        let err = workspace.resolve("/etc/passwd").unwrap_err();
        assert!(matches!(err, EngineError::OutsideRoot { .. }));
    }

    #[test]
    fn dotdot_inside_root_is_fine() {
        let (temp, workspace) = workspace();
        fs::create_dir(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("b.txt"), b"x").unwrap();

        let resolved = workspace.resolve("a/../b.txt").unwrap();
        assert_eq!(resolved.display(), "b.txt");
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let (temp, workspace) = workspace();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), b"s").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).unwrap();

        let err = workspace.resolve("link/secret.txt").unwrap_err();
        assert!(matches!(err, EngineError::OutsideRoot { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_root_is_allowed() {
        let (temp, workspace) = workspace();
        fs::create_dir(temp.path().join("real")).unwrap();
        fs::write(temp.path().join("real/f.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("alias")).unwrap();

        let resolved = workspace.resolve("alias/f.txt").unwrap();
        assert_eq!(resolved.display(), "real/f.txt");
    }

    #[test]
    fn nonexistent_target_still_resolves() {
        let (_temp, workspace) = workspace();
        let resolved = workspace.resolve("new/dir/file.txt").unwrap();
        assert!(!resolved.exists());
        assert_eq!(resolved.display(), "new/dir/file.txt");
    }

    #[test]
    fn resolve_existing_requires_presence() {
        let (_temp, workspace) = workspace();
        let err = workspace.resolve_existing("missing.txt").unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn unset_root_fails_every_resolution() {
        let workspace = Workspace::new(EngineConfig::default());
        assert!(matches!(
            workspace.resolve("anything"),
            Err(EngineError::RootUnset)
        ));
    }
}
