//! # Workbench Engine
//!
//! Sandboxed file and command operations over a single workspace root.
//!
//! ## Pipeline
//!
//! ```text
//! Caller path ("src/../lib.rs")
//!     │
//!     ├──> Path guard (normalize, resolve symlinks, confine to root)
//!     │      └─> ResolvedPath
//!     │
//!     ├──> Encoding detector (BOM / UTF-8 / configured fallback)
//!     │      └─> Decoded text + line terminator convention
//!     │
//!     └──> Operation (read, staged write, line edit, search, run)
//!            └─> Serializable outcome
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use workbench_engine::{EngineConfig, Workspace};
//!
//! #[tokio::main]
//! async fn main() -> workbench_engine::Result<()> {
//!     let workspace = Workspace::with_root("/path/to/project", EngineConfig::default())?;
//!
//!     workspace.create_file("notes.txt", "hello\nworld", None, false).await?;
//!     let read = workspace.read_file("notes.txt", None, None).await?;
//!     println!("{} ({} lines)", read.content, read.total_lines);
//!     Ok(())
//! }
//! ```
//!
//! Every mutation goes through temp-plus-rename staging, takes a timestamped
//! backup when configured, and is serialized per path. Paths that resolve
//! outside the root (including through symlinks) are rejected before any
//! filesystem access.

mod classify;
mod command;
mod config;
mod edit;
mod encoding;
mod error;
mod guard;
mod inspect;
mod search;
mod staging;
mod store;
mod util;
mod workspace;

pub use classify::mime_type;
pub use command::{CommandRequest, CommandResult};
pub use config::{EngineConfig, FallbackEncoding};
pub use edit::EditOutcome;
pub use encoding::{LineEnding, TextEncoding};
pub use error::{EngineError, Result};
pub use guard::ResolvedPath;
pub use inspect::{DirEntryInfo, DirListing, FileInfo, StructureNode, TextStats};
pub use search::{ContentMatch, SearchMatch, SearchReport, SearchRequest};
pub use store::{
    DeleteOutcome, EntryFailure, EntryKind, ReadResult, TransferOutcome, WriteOutcome,
};
pub use workspace::{RootChange, Workspace};
