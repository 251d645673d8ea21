use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Explicit operation context: the active project root, the engine
/// configuration and the per-path write locks.
///
/// The root starts unset; every path-bearing operation fails with
/// [`EngineError::RootUnset`] until [`Workspace::set_root`] succeeds.
/// Threading the context through calls (instead of process-global state)
/// lets tests run against several roots in parallel.
pub struct Workspace {
    root: RwLock<Option<PathBuf>>,
    config: EngineConfig,
    locks: PathLocks,
}

/// Outcome of replacing the project root.
#[derive(Debug, Clone, Serialize)]
pub struct RootChange {
    pub old_root: Option<PathBuf>,
    pub new_root: PathBuf,
}

impl Workspace {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            root: RwLock::new(None),
            config,
            locks: PathLocks::default(),
        }
    }

    pub fn with_root(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let workspace = Self::new(config);
        workspace.set_root(path)?;
        Ok(workspace)
    }

    /// Replace the project root. The new root must be an existing
    /// directory; it is canonicalized so later containment checks compare
    /// canonical paths on both sides.
    pub fn set_root(&self, path: impl AsRef<Path>) -> Result<RootChange> {
        let path = path.as_ref();
        let canonical = path
            .canonicalize()
            .map_err(|e| EngineError::from_io(e, path))?;
        if !canonical.is_dir() {
            return Err(EngineError::NotADirectory {
                path: path.display().to_string(),
            });
        }

        let mut slot = self.root.write().unwrap_or_else(|e| e.into_inner());
        let old_root = slot.replace(canonical.clone());
        log::info!(
            "project root set to {} (was {:?})",
            canonical.display(),
            old_root.as_deref().map(Path::display)
        );
        Ok(RootChange {
            old_root,
            new_root: canonical,
        })
    }

    /// The active canonical project root.
    pub fn root(&self) -> Result<PathBuf> {
        self.root
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(EngineError::RootUnset)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Serialization point for mutations of one target path. The returned
    /// handle must be locked for the whole read-modify-write; unrelated
    /// paths stay unblocked.
    pub(crate) fn write_lock(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        self.locks.handle(path)
    }

    /// Lock both sides of a transfer, in path order so two transfers over
    /// the same pair cannot deadlock. The same path on both sides yields a
    /// single guard.
    pub(crate) async fn lock_transfer(
        &self,
        a: &Path,
        b: &Path,
    ) -> (OwnedMutexGuard<()>, Option<OwnedMutexGuard<()>>) {
        if a == b {
            return (self.write_lock(a).lock_owned().await, None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.write_lock(first).lock_owned().await;
        let second = self.write_lock(second).lock_owned().await;
        (first, Some(second))
    }
}

#[derive(Default)]
struct PathLocks {
    inner: StdMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    fn handle(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Entries nobody holds any more are dead weight; drop them so the
        // map stays proportional to in-flight mutations.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn root_starts_unset() {
        let workspace = Workspace::new(EngineConfig::default());
        assert!(matches!(workspace.root(), Err(EngineError::RootUnset)));
    }

    #[test]
    fn set_root_requires_existing_directory() {
        let workspace = Workspace::new(EngineConfig::default());
        assert!(workspace.set_root("/definitely/not/here").is_err());

        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(workspace.set_root(&file).is_err());

        let change = workspace.set_root(temp.path()).unwrap();
        assert!(change.old_root.is_none());
        assert_eq!(workspace.root().unwrap(), change.new_root);
    }

    #[test]
    fn set_root_reports_previous_root() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let workspace = Workspace::with_root(a.path(), EngineConfig::default()).unwrap();
        let change = workspace.set_root(b.path()).unwrap();
        assert_eq!(change.old_root, Some(a.path().canonicalize().unwrap()));
    }

    #[test]
    fn same_path_yields_same_lock_handle() {
        let workspace = Workspace::new(EngineConfig::default());
        let a = workspace.write_lock(Path::new("/x/y"));
        let b = workspace.write_lock(Path::new("/x/y"));
        let c = workspace.write_lock(Path::new("/x/z"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn idle_lock_entries_are_evicted() {
        let workspace = Workspace::new(EngineConfig::default());
        let held = workspace.write_lock(Path::new("/held"));
        for i in 0..32 {
            drop(workspace.write_lock(Path::new(&format!("/scratch/{i}"))));
        }
        let other = workspace.write_lock(Path::new("/other"));

        let map = workspace.locks.inner.lock().unwrap();
        // Only the handles still held outside the map survive.
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(Path::new("/held")));
        assert!(map.contains_key(Path::new("/other")));
        drop(map);
        drop((held, other));
    }

    #[tokio::test]
    async fn lock_transfer_tolerates_equal_paths() {
        let workspace = Workspace::new(EngineConfig::default());
        let (first, second) = workspace
            .lock_transfer(Path::new("/same"), Path::new("/same"))
            .await;
        // A single guard, and acquiring it did not deadlock on itself.
        assert!(second.is_none());
        drop(first);
    }

    #[tokio::test]
    async fn lock_transfer_acquires_either_order() {
        let workspace = Workspace::new(EngineConfig::default());
        let a = Path::new("/a");
        let b = Path::new("/b");
        let guards = workspace.lock_transfer(a, b).await;
        drop(guards);
        let guards = workspace.lock_transfer(b, a).await;
        drop(guards);
    }
}
