//! Read-only inspection: bounded-depth structure trees, flat directory
//! listings and per-file metadata. One inaccessible subtree becomes an
//! error leaf instead of failing the whole walk.

use crate::classify;
use crate::encoding::{split_lines, TextEncoding};
use crate::error::{EngineError, Result};
use crate::store::EntryKind;
use crate::util::system_time_ms;
use crate::workspace::Workspace;
use serde::Serialize;
use std::path::Path;

/// Hidden entries that are still worth showing in structure walks.
const VISIBLE_HIDDEN: &[&str] = &[".env", ".gitignore", ".dockerignore"];

#[derive(Debug, Clone, Serialize)]
pub struct StructureNode {
    pub name: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_count: Option<usize>,
    /// Set on directories cut off by the depth limit.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StructureNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirListing {
    pub path: String,
    pub entries: Vec<DirEntryInfo>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextStats {
    pub lines: usize,
    pub characters: usize,
    pub words: usize,
    pub blank_lines: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<TextEncoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextStats>,
}

impl Workspace {
    /// Directory tree rooted at `path`, pruned at `max_depth` (0 = the
    /// node itself only). Hidden and noise directories are filtered the
    /// way search filters them.
    pub async fn structure(&self, path: &str, max_depth: usize) -> Result<StructureNode> {
        let resolved = self.resolve_existing(path)?;
        let absolute = resolved.absolute().to_path_buf();
        let name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| resolved.display());

        tokio::task::spawn_blocking(move || Ok(build_node(&absolute, name, max_depth)))
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
    }

    /// Flat listing of one directory: directories first, then files, each
    /// group sorted case-insensitively.
    pub async fn list_dir(&self, path: &str) -> Result<DirListing> {
        let resolved = self.resolve_existing(path)?;
        if !resolved.absolute().is_dir() {
            return Err(EngineError::NotADirectory {
                path: resolved.display(),
            });
        }

        let absolute = resolved.absolute().to_path_buf();
        let display = resolved.display();

        tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            for entry in std::fs::read_dir(&absolute)
                .map_err(|e| EngineError::from_io(e, &absolute))?
            {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        log::warn!("list_dir: unreadable entry in {}: {err}", absolute.display());
                        continue;
                    }
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                let meta = entry.metadata().ok();
                let is_dir = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
                let path = entry.path();

                entries.push(DirEntryInfo {
                    kind: if is_dir {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    },
                    size_bytes: meta.as_ref().filter(|m| m.is_file()).map(|m| m.len()),
                    modified_ms: meta
                        .as_ref()
                        .and_then(|m| m.modified().ok())
                        .map(system_time_ms),
                    extension: extension_of(&path).filter(|_| !is_dir),
                    mime_type: if is_dir { None } else { classify::mime_type(&path) },
                    name,
                });
            }

            entries.sort_by(|a, b| {
                let a_file = a.kind == EntryKind::File;
                let b_file = b.kind == EntryKind::File;
                a_file
                    .cmp(&b_file)
                    .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            });

            let total = entries.len();
            Ok(DirListing {
                path: display,
                entries,
                total,
            })
        })
        .await
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
    }

    /// Detailed metadata for one path. Text statistics and the detected
    /// encoding are filled in for readable text files under the read cap.
    pub async fn file_info(&self, path: &str) -> Result<FileInfo> {
        let resolved = self.resolve_existing(path)?;
        let absolute = resolved.absolute();
        let meta = tokio::fs::metadata(absolute)
            .await
            .map_err(|e| EngineError::from_io(e, absolute))?;

        let is_file = meta.is_file();
        let mut info = FileInfo {
            path: resolved.display(),
            name: absolute
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            kind: if is_file {
                EntryKind::File
            } else {
                EntryKind::Directory
            },
            size_bytes: is_file.then(|| meta.len()),
            extension: if is_file { extension_of(absolute) } else { None },
            mime_type: if is_file {
                classify::mime_type(absolute)
            } else {
                None
            },
            modified_ms: meta.modified().ok().map(system_time_ms),
            encoding: None,
            text: None,
        };

        let binary = if is_file {
            let probe = absolute.to_path_buf();
            tokio::task::spawn_blocking(move || classify::is_likely_binary(&probe))
                .await
                .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
        } else {
            false
        };

        if is_file && meta.len() <= self.config().max_file_read_bytes && !binary {
            if let Ok((text, encoding, _)) = self.read_text(&resolved).await {
                let (lines, _) = split_lines(&text);
                info.encoding = Some(encoding);
                info.text = Some(TextStats {
                    lines: lines.len(),
                    characters: text.chars().count(),
                    words: text.split_whitespace().count(),
                    blank_lines: lines.iter().filter(|l| l.trim().is_empty()).count(),
                });
            }
        }

        Ok(info)
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn keep_in_structure(name: &str, is_dir: bool) -> bool {
    if is_dir && classify::is_skipped_dir(name) {
        return false;
    }
    if name.starts_with('.') {
        return VISIBLE_HIDDEN.contains(&name);
    }
    true
}

fn build_node(path: &Path, name: String, depth_left: usize) -> StructureNode {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            return error_leaf(name, err.to_string());
        }
    };

    if !meta.is_dir() {
        return StructureNode {
            name,
            kind: EntryKind::File,
            size_bytes: Some(meta.len()),
            child_count: None,
            truncated: false,
            error: None,
            children: Vec::new(),
        };
    }

    let entries = match std::fs::read_dir(path) {
        Ok(iter) => iter,
        Err(err) => {
            // Permission problems become a leaf; the rest of the walk goes on.
            return error_leaf(name, err.to_string());
        }
    };

    let mut listed: Vec<(String, bool, std::path::PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if keep_in_structure(&entry_name, is_dir) {
            listed.push((entry_name, is_dir, entry.path()));
        }
    }
    listed.sort_by(|a, b| {
        // Directories first, then files, case-insensitive within each group.
        b.1.cmp(&a.1)
            .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
    });

    let child_count = listed.len();
    let (children, truncated) = if depth_left == 0 {
        (Vec::new(), child_count > 0)
    } else {
        let children = listed
            .into_iter()
            .map(|(child_name, _, child_path)| build_node(&child_path, child_name, depth_left - 1))
            .collect();
        (children, false)
    };

    StructureNode {
        name,
        kind: EntryKind::Directory,
        size_bytes: None,
        child_count: Some(child_count),
        truncated,
        error: None,
        children,
    }
}

fn error_leaf(name: String, reason: String) -> StructureNode {
    StructureNode {
        name,
        kind: EntryKind::Directory,
        size_bytes: None,
        child_count: None,
        truncated: false,
        error: Some(reason),
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let temp = tempdir().unwrap();
        let workspace = Workspace::with_root(temp.path(), EngineConfig::default()).unwrap();
        (temp, workspace)
    }

    #[tokio::test]
    async fn structure_respects_max_depth() {
        let (_temp, ws) = workspace();
        ws.create_file("a/b/c/deep.txt", "x", None, true).await.unwrap();

        let root = ws.structure("", 1).await.unwrap();
        assert_eq!(root.kind, EntryKind::Directory);
        assert_eq!(root.children.len(), 1);
        let a = &root.children[0];
        assert_eq!(a.name, "a");
        // Depth limit hit: 'a' knows it has children but does not list them.
        assert!(a.truncated);
        assert!(a.children.is_empty());
        assert_eq!(a.child_count, Some(1));
    }

    #[tokio::test]
    async fn structure_depth_zero_is_root_only() {
        let (_temp, ws) = workspace();
        ws.create_file("f.txt", "x", None, false).await.unwrap();
        let root = ws.structure("", 0).await.unwrap();
        assert!(root.children.is_empty());
        assert!(root.truncated);
    }

    #[tokio::test]
    async fn structure_orders_directories_before_files() {
        let (_temp, ws) = workspace();
        ws.create_file("zeta.txt", "x", None, false).await.unwrap();
        ws.create_file("Alpha/inner.txt", "x", None, true).await.unwrap();
        ws.create_file("beta/inner.txt", "x", None, true).await.unwrap();

        let root = ws.structure("", 1).await.unwrap();
        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "zeta.txt"]);
    }

    #[tokio::test]
    async fn structure_hides_noise_and_most_hidden_entries() {
        let (_temp, ws) = workspace();
        ws.create_file("src/a.rs", "x", None, true).await.unwrap();
        ws.create_file("node_modules/x.js", "x", None, true).await.unwrap();
        ws.create_file(".hidden/secret.txt", "x", None, true).await.unwrap();
        ws.create_file(".gitignore", "target\n", None, false).await.unwrap();

        let root = ws.structure("", 2).await.unwrap();
        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["src", ".gitignore"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_directory_becomes_error_leaf() {
        use std::os::unix::fs::PermissionsExt;

        let (temp, ws) = workspace();
        ws.create_file("open/a.txt", "x", None, true).await.unwrap();
        ws.create_file("locked/b.txt", "x", None, true).await.unwrap();
        let locked = temp.path().join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let root = ws.structure("", 2).await.unwrap();
        // Restore so the tempdir can be cleaned up.
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        let locked_node = root
            .children
            .iter()
            .find(|c| c.name == "locked")
            .expect("locked dir present");
        assert!(locked_node.error.is_some());

        let open_node = root.children.iter().find(|c| c.name == "open").unwrap();
        assert_eq!(open_node.children.len(), 1);
    }

    #[tokio::test]
    async fn list_dir_sorts_and_annotates() {
        let (_temp, ws) = workspace();
        ws.create_file("b.md", "x", None, false).await.unwrap();
        ws.create_file("A.txt", "x", None, false).await.unwrap();
        ws.create_file("sub/inner.txt", "x", None, true).await.unwrap();

        let listing = ws.list_dir("").await.unwrap();
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["sub", "A.txt", "b.md"]);
        assert_eq!(listing.total, 3);

        let md = listing.entries.iter().find(|e| e.name == "b.md").unwrap();
        assert_eq!(md.mime_type, Some("text/markdown"));
        assert_eq!(md.extension.as_deref(), Some("md"));
        assert!(md.size_bytes.is_some());
        assert!(md.modified_ms.is_some());
    }

    #[tokio::test]
    async fn list_dir_requires_a_directory() {
        let (_temp, ws) = workspace();
        ws.create_file("f.txt", "x", None, false).await.unwrap();
        let err = ws.list_dir("f.txt").await.unwrap_err();
        assert!(matches!(err, EngineError::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn file_info_counts_text_shape() {
        let (_temp, ws) = workspace();
        ws.create_file("f.txt", "one two\n\nthree\n", None, false)
            .await
            .unwrap();

        let info = ws.file_info("f.txt").await.unwrap();
        assert_eq!(info.kind, EntryKind::File);
        assert_eq!(info.encoding, Some(TextEncoding::Utf8));
        let text = info.text.expect("text stats");
        assert_eq!(text.lines, 3);
        assert_eq!(text.words, 3);
        assert_eq!(text.blank_lines, 1);
    }

    #[tokio::test]
    async fn file_info_on_binary_has_no_text_stats() {
        let (temp, ws) = workspace();
        std::fs::write(temp.path().join("blob.bin"), b"\x00\x01\x02").unwrap();
        let info = ws.file_info("blob.bin").await.unwrap();
        assert!(info.text.is_none());
        assert!(info.encoding.is_none());
    }

    #[tokio::test]
    async fn file_info_on_directory() {
        let (_temp, ws) = workspace();
        ws.create_file("d/f.txt", "x", None, true).await.unwrap();
        let info = ws.file_info("d").await.unwrap();
        assert_eq!(info.kind, EntryKind::Directory);
        assert!(info.size_bytes.is_none());
        assert!(info.text.is_none());
    }
}
