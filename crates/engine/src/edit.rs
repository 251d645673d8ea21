//! Line-addressed editing on top of the staged-write primitive. Every edit
//! restages the whole file through temp-plus-rename; nothing is mutated in
//! place. Encoding is re-detected per edit and the dominant line terminator
//! of the original file is preserved on rewrite (mixed terminators are
//! normalized to the dominant one - an explicit policy).

use crate::encoding::{join_lines, split_lines, LineEnding, TextEncoding};
use crate::error::{EngineError, Result};
use crate::staging::{create_backup, StagedWrite};
use crate::workspace::Workspace;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub path: String,
    pub lines_before: usize,
    pub lines_after: usize,
    pub encoding: TextEncoding,
    pub line_ending: LineEnding,
    pub backup: Option<PathBuf>,
}

impl Workspace {
    /// Insert `content` so it becomes the line(s) starting at
    /// `line_number`; the current line at that position and everything
    /// after it shift down. `line_number` may be `line_count + 1` to append
    /// at the end. Empty content inserts a single blank line.
    pub async fn insert_lines(
        &self,
        path: &str,
        line_number: usize,
        content: &str,
    ) -> Result<EditOutcome> {
        self.edit(path, move |lines, display| {
            if line_number < 1 || line_number > lines.len() + 1 {
                return Err(EngineError::InvalidLineNumber {
                    path: display.to_string(),
                    line: line_number,
                    line_count: lines.len(),
                });
            }
            let mut inserted = lines_of(content);
            lines.splice(line_number - 1..line_number - 1, inserted.drain(..));
            Ok(())
        })
        .await
    }

    /// Remove lines `start..=end` (1-based, inclusive) and substitute
    /// `content`, which may expand to a different number of lines. Empty
    /// content substitutes nothing, making this the deletion primitive.
    pub async fn replace_lines(
        &self,
        path: &str,
        start: usize,
        end: usize,
        content: &str,
    ) -> Result<EditOutcome> {
        self.edit(path, move |lines, display| {
            if start < 1 || start > end || end > lines.len() {
                return Err(EngineError::InvalidRange {
                    path: display.to_string(),
                    start,
                    end,
                    line_count: lines.len(),
                });
            }
            let replacement = if content.is_empty() {
                Vec::new()
            } else {
                lines_of(content)
            };
            lines.splice(start - 1..end, replacement);
            Ok(())
        })
        .await
    }

    /// Delete lines `start..=end`; equivalent to replacing them with
    /// nothing.
    pub async fn delete_lines(&self, path: &str, start: usize, end: usize) -> Result<EditOutcome> {
        self.replace_lines(path, start, end, "").await
    }

    /// Shared read-modify-write cycle: decode, edit the logical lines,
    /// re-encode with the file's own encoding and terminator, and commit
    /// through the staging guard under the per-path write lock.
    async fn edit<F>(&self, path: &str, mutate: F) -> Result<EditOutcome>
    where
        F: FnOnce(&mut Vec<String>, &str) -> Result<()>,
    {
        let resolved = self.resolve_existing(path)?;
        let lock = self.write_lock(resolved.absolute());
        let _guard = lock.lock().await;

        let (text, encoding, _) = self.read_text(&resolved).await?;
        let line_ending = LineEnding::detect(&text);
        let (mut lines, trailing_newline) = split_lines(&text);
        let lines_before = lines.len();

        let display = resolved.display();
        mutate(&mut lines, &display)?;
        let lines_after = lines.len();

        let backup = if self.config().backup_enabled {
            Some(create_backup(resolved.absolute()).await?)
        } else {
            None
        };

        let rebuilt = join_lines(&lines, line_ending, trailing_newline);
        let bytes = encoding.encode(&rebuilt, resolved.absolute())?;
        StagedWrite::stage(resolved.absolute(), &bytes)
            .await?
            .commit()
            .await?;

        Ok(EditOutcome {
            path: display,
            lines_before,
            lines_after,
            encoding,
            line_ending,
            backup,
        })
    }
}

fn lines_of(content: &str) -> Vec<String> {
    if content.is_empty() {
        return vec![String::new()];
    }
    let (lines, _) = split_lines(content);
    lines
}
