//! Name and content search across the tree. Traversal is deterministic
//! (directories before files, each group lexicographic) so results are
//! reproducible on an unchanged tree; symlinks are never followed.

use crate::classify;
use crate::error::{EngineError, Result};
use crate::workspace::Workspace;
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MAX_MATCHES_PER_FILE: usize = 10;
const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Glob-style name pattern (`*`, `?`). For content search the wildcard
    /// characters are stripped and the remainder is used as the needle.
    pub pattern: String,
    /// Subtree to search, relative to the root; the whole root if absent.
    pub path: Option<String>,
    pub include_content: bool,
    pub case_sensitive: bool,
    pub file_extensions: Option<Vec<String>>,
    /// Result cap; clamped to the configured `max_search_results`.
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentMatch {
    pub line_number: usize,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub path: String,
    pub name: String,
    pub size_bytes: u64,
    pub extension: Option<String>,
    pub content_matches: Vec<ContentMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub pattern: String,
    pub matches: Vec<SearchMatch>,
    /// Set when traversal stopped at the result cap with matches left.
    pub truncated: bool,
    pub files_scanned: usize,
}

impl Workspace {
    pub async fn search(&self, request: SearchRequest) -> Result<SearchReport> {
        let base = self.resolve_existing(request.path.as_deref().unwrap_or(""))?;
        if !base.absolute().is_dir() {
            return Err(EngineError::NotADirectory {
                path: base.display(),
            });
        }

        let configured_cap = self.config().max_search_results;
        let max_results = request
            .max_results
            .unwrap_or(configured_cap)
            .clamp(1, configured_cap);

        let glob = GlobBuilder::new(&request.pattern)
            .case_insensitive(!request.case_sensitive)
            .build()
            .map_err(|e| EngineError::InvalidPattern {
                pattern: request.pattern.clone(),
                reason: e.to_string(),
            })?
            .compile_matcher();

        let needle = request.pattern.replace(['*', '?'], "");
        let extensions: Option<Vec<String>> = request.file_extensions.as_ref().map(|exts| {
            exts.iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect()
        });

        let root = self.root()?;
        let base_path = base.absolute().to_path_buf();
        let max_read = self.config().max_file_read_bytes;
        let pattern = request.pattern.clone();
        let include_content = request.include_content;
        let case_sensitive = request.case_sensitive;

        tokio::task::spawn_blocking(move || {
            scan(ScanParams {
                root,
                base: base_path,
                glob,
                needle,
                pattern,
                extensions,
                include_content,
                case_sensitive,
                max_results,
                max_read,
            })
        })
        .await
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
    }
}

struct ScanParams {
    root: PathBuf,
    base: PathBuf,
    glob: globset::GlobMatcher,
    needle: String,
    pattern: String,
    extensions: Option<Vec<String>>,
    include_content: bool,
    case_sensitive: bool,
    max_results: usize,
    max_read: u64,
}

fn scan(params: ScanParams) -> Result<SearchReport> {
    let mut matches: Vec<SearchMatch> = Vec::new();
    let mut truncated = false;
    let mut files_scanned = 0usize;

    let walker = walkdir::WalkDir::new(&params.base)
        .follow_links(false)
        .sort_by(|a, b| {
            let a_dir = a.file_type().is_dir();
            let b_dir = b.file_type().is_dir();
            b_dir
                .cmp(&a_dir)
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(classify::is_skipped_dir))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("search: failed to read entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        if let Some(wanted) = &params.extensions {
            match &extension {
                Some(ext) if wanted.iter().any(|w| w == ext) => {}
                _ => continue,
            }
        }

        files_scanned += 1;
        let name_matched = params.glob.is_match(Path::new(&name));

        let content_matches = if params.include_content && !params.needle.is_empty() {
            scan_content(
                path,
                &params.needle,
                params.case_sensitive,
                params.max_read,
            )
        } else {
            Vec::new()
        };

        if !name_matched && content_matches.is_empty() {
            continue;
        }

        if matches.len() >= params.max_results {
            truncated = true;
            break;
        }

        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let relative = path
            .strip_prefix(&params.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        matches.push(SearchMatch {
            path: relative,
            name,
            size_bytes,
            extension,
            content_matches,
        });
    }

    Ok(SearchReport {
        pattern: params.pattern,
        matches,
        truncated,
        files_scanned,
    })
}

/// Substring scan of one candidate file, bounded by the read cap and
/// skipping binary content. Decoding is lossy here: search is a discovery
/// aid, unlike the strict read path.
fn scan_content(path: &Path, needle: &str, case_sensitive: bool, max_read: u64) -> Vec<ContentMatch> {
    let Ok(meta) = path.metadata() else {
        return Vec::new();
    };
    if meta.len() > max_read || classify::is_likely_binary(path) {
        return Vec::new();
    }
    let Ok(bytes) = std::fs::read(path) else {
        return Vec::new();
    };
    let content = String::from_utf8_lossy(&bytes);

    let needle_cmp = if case_sensitive {
        needle.to_string()
    } else {
        needle.to_lowercase()
    };

    let mut found = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let haystack = if case_sensitive {
            line.to_string()
        } else {
            line.to_lowercase()
        };
        if haystack.contains(&needle_cmp) {
            found.push(ContentMatch {
                line_number: idx + 1,
                snippet: snippet_of(line),
            });
            if found.len() >= MAX_MATCHES_PER_FILE {
                break;
            }
        }
    }
    found
}

fn snippet_of(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= SNIPPET_MAX_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().take(SNIPPET_MAX_CHARS).collect()
    }
}
