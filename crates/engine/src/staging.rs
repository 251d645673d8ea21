//! Crash-safe mutation plumbing: staged writes that either fully commit or
//! fully discard, and timestamped sibling backups taken before destructive
//! operations.

use crate::error::{EngineError, Result};
use crate::util::unix_now_ms;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// A pending write to `target`, parked in a temporary sibling file.
///
/// [`StagedWrite::commit`] renames the staged file over the target, which is
/// atomic on the same filesystem; dropping without committing removes the
/// staged file. A crash mid-write therefore never leaves the target
/// half-written: either the original bytes or the new bytes are present.
pub(crate) struct StagedWrite {
    staged: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedWrite {
    pub(crate) async fn stage(target: &Path, bytes: &[u8]) -> Result<Self> {
        let staged = staging_path(target);
        tokio::fs::write(&staged, bytes)
            .await
            .map_err(|e| EngineError::from_io(e, &staged))?;
        Ok(Self {
            staged,
            target: target.to_path_buf(),
            committed: false,
        })
    }

    pub(crate) async fn commit(mut self) -> Result<()> {
        tokio::fs::rename(&self.staged, &self.target)
            .await
            .map_err(|e| EngineError::from_io(e, &self.target))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(err) = std::fs::remove_file(&self.staged) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!(
                        "failed to discard staged file {}: {err}",
                        self.staged.display()
                    );
                }
            }
        }
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "staged".to_string());
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.{}-{seq}.tmp", unix_now_ms()))
}

/// Sibling backup path for `target`: `<name>.<unix-millis>.bak`.
pub(crate) fn backup_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_string());
    target.with_file_name(format!("{name}.{}.bak", unix_now_ms()))
}

/// Copy `target` (file or directory) to its timestamped sibling backup and
/// return the backup location. Directory backups are strict: any entry
/// failure fails the backup, because a partial safety copy is worse than an
/// early error.
pub(crate) async fn create_backup(target: &Path) -> Result<PathBuf> {
    let backup = backup_path(target);
    let meta = tokio::fs::metadata(target)
        .await
        .map_err(|e| EngineError::from_io(e, target))?;

    if meta.is_dir() {
        let src = target.to_path_buf();
        let dest = backup.clone();
        tokio::task::spawn_blocking(move || copy_dir_strict(&src, &dest))
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;
    } else {
        tokio::fs::copy(target, &backup)
            .await
            .map_err(|e| EngineError::from_io(e, target))?;
    }

    log::debug!(
        "backed up {} to {}",
        target.display(),
        backup.display()
    );
    Ok(backup)
}

fn copy_dir_strict(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| EngineError::from_io(e, dest))?;
    for entry in std::fs::read_dir(src).map_err(|e| EngineError::from_io(e, src))? {
        let entry = entry.map_err(|e| EngineError::from_io(e, src))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| EngineError::from_io(e, &from))?;
        if file_type.is_dir() {
            copy_dir_strict(&from, &to)?;
        } else if file_type.is_file() {
            std::fs::copy(&from, &to).map_err(|e| EngineError::from_io(e, &from))?;
        }
        // Symlinks are skipped: backups never follow links out of the tree.
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn commit_replaces_target_atomically() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("a.txt");
        tokio::fs::write(&target, b"old").await.unwrap();

        let staged = StagedWrite::stage(&target, b"new").await.unwrap();
        // Target untouched while staged.
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
        staged.commit().await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
    }

    #[tokio::test]
    async fn dropping_discards_the_staged_file() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("a.txt");
        tokio::fs::write(&target, b"old").await.unwrap();

        {
            let _staged = StagedWrite::stage(&target, b"new").await.unwrap();
        }

        assert_eq!(std::fs::read(&target).unwrap(), b"old");
        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("a.txt")]);
    }

    #[tokio::test]
    async fn file_backup_is_a_sibling_bak() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("notes.txt");
        tokio::fs::write(&target, b"content").await.unwrap();

        let backup = create_backup(&target).await.unwrap();
        assert_eq!(backup.parent(), target.parent());
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("notes.txt."));
        assert!(name.ends_with(".bak"));
        assert_eq!(std::fs::read(&backup).unwrap(), b"content");
    }

    #[tokio::test]
    async fn directory_backup_copies_recursively() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("proj");
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        std::fs::write(dir.join("sub/f.txt"), b"deep").unwrap();

        let backup = create_backup(&dir).await.unwrap();
        assert_eq!(std::fs::read(backup.join("sub/f.txt")).unwrap(), b"deep");
    }
}
