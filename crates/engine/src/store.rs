//! Primitive file operations: encoding-aware reads with line ranges, and
//! backup-before-mutate writes that commit through the staging guard so a
//! crash never leaves a half-written target.

use crate::classify;
use crate::encoding::{split_lines, LineEnding, TextEncoding, DETECT_PREFIX_BYTES};
use crate::error::{EngineError, Result};
use crate::guard::ResolvedPath;
use crate::staging::{create_backup, StagedWrite};
use crate::workspace::Workspace;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Content returned by [`Workspace::read_file`].
#[derive(Debug, Clone, Serialize)]
pub struct ReadResult {
    pub path: String,
    pub content: String,
    pub encoding: TextEncoding,
    pub line_ending: LineEnding,
    pub total_lines: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub size_bytes: u64,
    pub mime_type: Option<&'static str>,
}

/// Outcome of a single-file mutation.
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub path: String,
    pub bytes_written: u64,
    pub encoding: TextEncoding,
    /// Location of the pre-mutation safety copy, when one was taken.
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub path: String,
    pub kind: EntryKind,
    pub backup: Option<PathBuf>,
}

/// One entry a bulk copy/move failed on. Bulk operations are best-effort,
/// not transactional: the destination may hold a partial result and this
/// report says exactly what made it partial.
#[derive(Debug, Clone, Serialize)]
pub struct EntryFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub source: String,
    pub dest: String,
    pub entries_copied: usize,
    pub failures: Vec<EntryFailure>,
    pub backup: Option<PathBuf>,
}

impl Workspace {
    /// Read a file, optionally restricted to an inclusive 1-based line
    /// range. Bounds clamp to the file extents; a range that lies entirely
    /// beyond EOF fails with `RangeOutOfBounds`, a reversed range with
    /// `InvalidRange`. A full read returns the decoded content verbatim.
    pub async fn read_file(
        &self,
        path: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<ReadResult> {
        let resolved = self.resolve_existing(path)?;
        let (content, encoding, size_bytes) = self.read_text(&resolved).await?;
        let line_ending = LineEnding::detect(&content);
        let (lines, _) = split_lines(&content);
        let total_lines = lines.len();

        let display = resolved.display();
        let mime_type = classify::mime_type(resolved.absolute());

        let (content, start, end) = match (start_line, end_line) {
            (None, None) => (content, 1, total_lines),
            (start, end) => {
                let start = start.unwrap_or(1).max(1);
                let end = end.unwrap_or(usize::MAX);
                if end < start {
                    return Err(EngineError::InvalidRange {
                        path: display,
                        start,
                        end,
                        line_count: total_lines,
                    });
                }
                if start > total_lines {
                    return Err(EngineError::RangeOutOfBounds {
                        path: display,
                        start,
                        end,
                        line_count: total_lines,
                    });
                }
                let end = end.min(total_lines);
                let slice = lines[start - 1..end].join(line_ending.as_str());
                (slice, start, end)
            }
        };

        Ok(ReadResult {
            path: resolved.display(),
            content,
            encoding,
            line_ending,
            total_lines,
            start_line: start,
            end_line: end,
            size_bytes,
            mime_type,
        })
    }

    /// Create a new file. Fails with `AlreadyExists` if the target exists;
    /// a missing parent fails with `ParentMissing` unless `create_parents`.
    pub async fn create_file(
        &self,
        path: &str,
        content: &str,
        encoding: Option<TextEncoding>,
        create_parents: bool,
    ) -> Result<WriteOutcome> {
        let resolved = self.resolve(path)?;
        let lock = self.write_lock(resolved.absolute());
        let _guard = lock.lock().await;

        if resolved.exists() {
            return Err(EngineError::AlreadyExists {
                path: resolved.display(),
            });
        }
        self.ensure_parent(&resolved, create_parents).await?;

        let encoding = encoding.unwrap_or(TextEncoding::Utf8);
        let bytes = encoding.encode(content, resolved.absolute())?;
        let bytes_written = bytes.len() as u64;
        StagedWrite::stage(resolved.absolute(), &bytes)
            .await?
            .commit()
            .await?;

        Ok(WriteOutcome {
            path: resolved.display(),
            bytes_written,
            encoding,
            backup: None,
        })
    }

    /// Overwrite a file completely. An existing target is backed up first
    /// (unless backups are disabled) and replaced atomically. When no
    /// encoding is requested, an existing file keeps its detected encoding
    /// and a new file is written as UTF-8.
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
        encoding: Option<TextEncoding>,
        create_parents: bool,
    ) -> Result<WriteOutcome> {
        let resolved = self.resolve(path)?;
        let lock = self.write_lock(resolved.absolute());
        let _guard = lock.lock().await;

        let exists = resolved.exists();
        if exists && !resolved.absolute().is_file() {
            return Err(EngineError::NotAFile {
                path: resolved.display(),
            });
        }
        self.ensure_parent(&resolved, create_parents).await?;

        let encoding = match encoding {
            Some(e) => e,
            None if exists => self.detect_encoding(&resolved).await?,
            None => TextEncoding::Utf8,
        };

        let backup = if exists && self.config().backup_enabled {
            Some(create_backup(resolved.absolute()).await?)
        } else {
            None
        };

        let bytes = encoding.encode(content, resolved.absolute())?;
        let bytes_written = bytes.len() as u64;
        StagedWrite::stage(resolved.absolute(), &bytes)
            .await?
            .commit()
            .await?;

        Ok(WriteOutcome {
            path: resolved.display(),
            bytes_written,
            encoding,
            backup,
        })
    }

    /// Append to an existing file. With `leading_newline`, a terminator is
    /// inserted first when the file does not already end with one, so the
    /// appended content starts on a fresh line.
    pub async fn append_file(
        &self,
        path: &str,
        content: &str,
        encoding: Option<TextEncoding>,
        leading_newline: bool,
    ) -> Result<WriteOutcome> {
        let resolved = self.resolve_existing(path)?;
        let lock = self.write_lock(resolved.absolute());
        let _guard = lock.lock().await;

        let (mut text, detected, _) = self.read_text(&resolved).await?;
        let line_ending = LineEnding::detect(&text);
        if leading_newline && !text.is_empty() && !text.ends_with('\n') {
            text.push_str(line_ending.as_str());
        }
        text.push_str(content);

        let encoding = encoding.unwrap_or(detected);
        let backup = if self.config().backup_enabled {
            Some(create_backup(resolved.absolute()).await?)
        } else {
            None
        };

        let bytes = encoding.encode(&text, resolved.absolute())?;
        let bytes_written = bytes.len() as u64;
        StagedWrite::stage(resolved.absolute(), &bytes)
            .await?
            .commit()
            .await?;

        Ok(WriteOutcome {
            path: resolved.display(),
            bytes_written,
            encoding,
            backup,
        })
    }

    /// Copy a file or directory tree. Directory copies are best-effort:
    /// entries that fail are reported in the outcome while the rest
    /// proceed. Overwriting an existing destination file takes a backup
    /// first.
    pub async fn copy_path(
        &self,
        source: &str,
        dest: &str,
        create_parents: bool,
    ) -> Result<TransferOutcome> {
        let src = self.resolve_existing(source)?;
        let dst = self.resolve(dest)?;
        let _guards = self.lock_transfer(src.absolute(), dst.absolute()).await;
        self.ensure_parent(&dst, create_parents).await?;

        if src.absolute().is_dir() {
            if dst.absolute().starts_with(src.absolute()) {
                return Err(EngineError::Io(std::io::Error::other(format!(
                    "cannot copy '{}' into itself",
                    src.display()
                ))));
            }
            let (entries_copied, failures) =
                copy_tree_best_effort(src.absolute().to_path_buf(), dst.absolute().to_path_buf())
                    .await?;
            Ok(TransferOutcome {
                source: src.display(),
                dest: dst.display(),
                entries_copied,
                failures,
                backup: None,
            })
        } else {
            let backup = if dst.exists() && self.config().backup_enabled {
                Some(create_backup(dst.absolute()).await?)
            } else {
                None
            };
            tokio::fs::copy(src.absolute(), dst.absolute())
                .await
                .map_err(|e| EngineError::from_io(e, src.absolute()))?;
            Ok(TransferOutcome {
                source: src.display(),
                dest: dst.display(),
                entries_copied: 1,
                failures: Vec::new(),
                backup,
            })
        }
    }

    /// Move (rename) a file or directory. A same-filesystem rename is
    /// atomic; across filesystems this degrades to best-effort copy plus
    /// delete-on-full-success. Overwriting an existing destination file
    /// takes a backup first; an existing destination directory is refused.
    pub async fn move_path(
        &self,
        source: &str,
        dest: &str,
        create_parents: bool,
    ) -> Result<TransferOutcome> {
        let src = self.resolve_existing(source)?;
        if src.relative().as_os_str().is_empty() {
            return Err(EngineError::RootRemoval);
        }
        let dst = self.resolve(dest)?;
        let _guards = self.lock_transfer(src.absolute(), dst.absolute()).await;
        self.ensure_parent(&dst, create_parents).await?;

        let mut backup = None;
        if dst.exists() {
            if dst.absolute().is_dir() {
                return Err(EngineError::AlreadyExists { path: dst.display() });
            }
            if self.config().backup_enabled {
                backup = Some(create_backup(dst.absolute()).await?);
            }
            tokio::fs::remove_file(dst.absolute())
                .await
                .map_err(|e| EngineError::from_io(e, dst.absolute()))?;
        }

        match tokio::fs::rename(src.absolute(), dst.absolute()).await {
            Ok(()) => Ok(TransferOutcome {
                source: src.display(),
                dest: dst.display(),
                entries_copied: 1,
                failures: Vec::new(),
                backup,
            }),
            Err(rename_err) => {
                log::debug!(
                    "rename {} -> {} failed ({rename_err}), falling back to copy",
                    src.display(),
                    dst.display()
                );
                let (entries_copied, failures) = if src.absolute().is_dir() {
                    copy_tree_best_effort(
                        src.absolute().to_path_buf(),
                        dst.absolute().to_path_buf(),
                    )
                    .await?
                } else {
                    tokio::fs::copy(src.absolute(), dst.absolute())
                        .await
                        .map_err(|e| EngineError::from_io(e, src.absolute()))?;
                    (1, Vec::new())
                };
                // Only remove the source once everything arrived.
                if failures.is_empty() {
                    remove_any(src.absolute()).await?;
                } else {
                    log::warn!(
                        "move of {} left source in place: {} entries failed to copy",
                        src.display(),
                        failures.len()
                    );
                }
                Ok(TransferOutcome {
                    source: src.display(),
                    dest: dst.display(),
                    entries_copied,
                    failures,
                    backup,
                })
            }
        }
    }

    /// Delete a file or directory tree, taking a backup first when
    /// `with_backup` is requested and backups are enabled.
    pub async fn delete_path(&self, path: &str, with_backup: bool) -> Result<DeleteOutcome> {
        let resolved = self.resolve_existing(path)?;
        // The root must stay an existing directory as long as it is set.
        if resolved.relative().as_os_str().is_empty() {
            return Err(EngineError::RootRemoval);
        }
        let lock = self.write_lock(resolved.absolute());
        let _guard = lock.lock().await;

        let kind = if resolved.absolute().is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let backup = if with_backup && self.config().backup_enabled {
            Some(create_backup(resolved.absolute()).await?)
        } else {
            None
        };

        remove_any(resolved.absolute()).await?;
        Ok(DeleteOutcome {
            path: resolved.display(),
            kind,
            backup,
        })
    }

    /// Detect the text encoding of an existing file from a bounded prefix.
    pub async fn detect_encoding(&self, resolved: &ResolvedPath) -> Result<TextEncoding> {
        let path = resolved.absolute().to_path_buf();
        let prefix = tokio::task::spawn_blocking(move || -> std::io::Result<(Vec<u8>, bool)> {
            use std::io::Read;
            let mut file = std::fs::File::open(&path)?;
            let mut buf = vec![0u8; DETECT_PREFIX_BYTES];
            let mut filled = 0usize;
            loop {
                let n = file.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
                if filled == buf.len() {
                    break;
                }
            }
            buf.truncate(filled);
            Ok((buf, filled == DETECT_PREFIX_BYTES))
        })
        .await
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;

        let (prefix, truncated) =
            prefix.map_err(|e| EngineError::from_io(e, resolved.absolute()))?;
        Ok(TextEncoding::detect(
            &prefix,
            truncated,
            self.config().default_encoding,
        ))
    }

    /// Read and decode a whole file, enforcing the configured size cap.
    pub(crate) async fn read_text(
        &self,
        resolved: &ResolvedPath,
    ) -> Result<(String, TextEncoding, u64)> {
        let meta = tokio::fs::metadata(resolved.absolute())
            .await
            .map_err(|e| EngineError::from_io(e, resolved.absolute()))?;
        if !meta.is_file() {
            return Err(EngineError::NotAFile {
                path: resolved.display(),
            });
        }
        let limit = self.config().max_file_read_bytes;
        if meta.len() > limit {
            return Err(EngineError::FileTooLarge {
                path: resolved.display(),
                size: meta.len(),
                limit,
            });
        }

        let encoding = self.detect_encoding(resolved).await?;
        let bytes = tokio::fs::read(resolved.absolute())
            .await
            .map_err(|e| EngineError::from_io(e, resolved.absolute()))?;
        let text = encoding.decode(&bytes, resolved.absolute())?;
        Ok((text, encoding, meta.len()))
    }

    async fn ensure_parent(&self, resolved: &ResolvedPath, create_parents: bool) -> Result<()> {
        let Some(parent) = resolved.absolute().parent() else {
            return Ok(());
        };
        if parent.exists() {
            return Ok(());
        }
        if !create_parents {
            return Err(EngineError::ParentMissing {
                path: resolved.display(),
            });
        }
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineError::from_io(e, parent))
    }
}

async fn remove_any(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    result.map_err(|e| EngineError::from_io(e, path))
}

/// Recursive best-effort directory copy: every entry is attempted, and
/// failures are collected per entry instead of aborting the whole copy.
async fn copy_tree_best_effort(
    src: PathBuf,
    dest: PathBuf,
) -> Result<(usize, Vec<EntryFailure>)> {
    tokio::task::spawn_blocking(move || {
        let mut copied = 0usize;
        let mut failures = Vec::new();

        for entry in walkdir::WalkDir::new(&src).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    failures.push(EntryFailure {
                        path: err
                            .path()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| src.display().to_string()),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(&src) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let target = dest.join(relative);

            let result = if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)
            } else if entry.file_type().is_file() {
                std::fs::copy(entry.path(), &target).map(|_| ())
            } else {
                // Symlinks are not copied; they could point outside the root.
                continue;
            };

            match result {
                Ok(()) => copied += 1,
                Err(err) => failures.push(EntryFailure {
                    path: entry.path().display().to_string(),
                    reason: err.to_string(),
                }),
            }
        }

        Ok((copied, failures))
    })
    .await
    .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
}
