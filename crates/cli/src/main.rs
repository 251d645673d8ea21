use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::env;
use std::io::Read;
use std::path::PathBuf;
use workbench_engine::{
    CommandRequest, EngineConfig, SearchRequest, TextEncoding, Workspace,
};

#[derive(Parser)]
#[command(name = "workbench")]
#[command(about = "Sandboxed file and command operations over a workspace root", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root (default: WORKBENCH_ROOT, then the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// TOML config file (WORKBENCH_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved workspace root and effective configuration
    Root,

    /// Read a file, optionally a 1-based inclusive line range
    Read {
        path: String,
        /// First line to read
        #[arg(long)]
        start: Option<usize>,
        /// Last line to read (inclusive)
        #[arg(long)]
        end: Option<usize>,
    },

    /// Create a new file (fails if it already exists)
    Create {
        path: String,
        /// Content; read from stdin when omitted
        content: Option<String>,
        #[arg(long, value_enum)]
        encoding: Option<EncodingArg>,
        /// Create missing parent directories
        #[arg(short = 'p', long)]
        parents: bool,
    },

    /// Overwrite a file completely (backs up an existing target)
    Write {
        path: String,
        /// Content; read from stdin when omitted
        content: Option<String>,
        #[arg(long, value_enum)]
        encoding: Option<EncodingArg>,
        #[arg(short = 'p', long)]
        parents: bool,
    },

    /// Append to an existing file
    Append {
        path: String,
        /// Content; read from stdin when omitted
        content: Option<String>,
        /// Start the appended content on a fresh line
        #[arg(short = 'n', long)]
        newline: bool,
    },

    /// Copy a file or directory tree inside the root
    Copy {
        source: String,
        dest: String,
        #[arg(short = 'p', long)]
        parents: bool,
    },

    /// Move (rename) a file or directory inside the root
    #[command(name = "move")]
    Move {
        source: String,
        dest: String,
        #[arg(short = 'p', long)]
        parents: bool,
    },

    /// Delete a file or directory tree
    Delete {
        path: String,
        /// Skip the pre-delete backup
        #[arg(long)]
        no_backup: bool,
    },

    /// Insert lines so they start at the given 1-based line number
    Insert {
        path: String,
        line: usize,
        /// Content; read from stdin when omitted
        content: Option<String>,
    },

    /// Replace an inclusive 1-based line range with new content
    Replace {
        path: String,
        start: usize,
        end: usize,
        /// Content; read from stdin when omitted
        content: Option<String>,
    },

    /// Delete an inclusive 1-based line range
    #[command(name = "delete-lines")]
    DeleteLines { path: String, start: usize, end: usize },

    /// Find files by glob-style name pattern, optionally matching content
    Search {
        pattern: String,
        /// Subtree to search, relative to the root
        #[arg(long)]
        path: Option<String>,
        /// Also scan file contents for the pattern text
        #[arg(short = 'c', long)]
        content: bool,
        #[arg(long)]
        case_sensitive: bool,
        /// Restrict to these extensions (repeatable)
        #[arg(long = "ext")]
        extensions: Vec<String>,
        /// Result cap (clamped to the configured maximum)
        #[arg(long)]
        max: Option<usize>,
    },

    /// Show the directory tree to a given depth
    Tree {
        #[arg(default_value = ".")]
        path: String,
        #[arg(short = 'd', long, default_value_t = 3)]
        depth: usize,
    },

    /// List one directory with per-entry annotations
    Ls {
        #[arg(default_value = ".")]
        path: String,
    },

    /// Show metadata and text statistics for a file
    Info { path: String },

    /// Run an allow-listed command inside the root
    Run {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Working directory relative to the root
        #[arg(long)]
        cwd: Option<String>,
        /// Timeout in seconds (clamped to the configured maximum)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodingArg {
    #[value(name = "utf-8")]
    Utf8,
    #[value(name = "utf-8-bom")]
    Utf8Bom,
    #[value(name = "utf-16-le")]
    Utf16Le,
    #[value(name = "utf-16-be")]
    Utf16Be,
    #[value(name = "latin-1")]
    Latin1,
    #[value(name = "windows-1252")]
    Windows1252,
}

impl From<EncodingArg> for TextEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Utf8 => TextEncoding::Utf8,
            EncodingArg::Utf8Bom => TextEncoding::Utf8Bom,
            EncodingArg::Utf16Le => TextEncoding::Utf16Le,
            EncodingArg::Utf16Be => TextEncoding::Utf16Be,
            EncodingArg::Latin1 => TextEncoding::Latin1,
            EncodingArg::Windows1252 => TextEncoding::Windows1252,
        }
    }
}

#[derive(Serialize)]
struct RootReport<'a> {
    root: String,
    config: &'a EngineConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.apply_env_overrides();

    let root = cli
        .root
        .clone()
        .or_else(|| env::var_os("WORKBENCH_ROOT").map(PathBuf::from))
        .map(Ok)
        .unwrap_or_else(env::current_dir)?;
    let workspace = Workspace::with_root(&root, config)
        .with_context(|| format!("cannot use {} as workspace root", root.display()))?;

    match cli.command {
        Commands::Root => {
            let report = RootReport {
                root: workspace.root()?.display().to_string(),
                config: workspace.config(),
            };
            emit(&report)?;
        }
        Commands::Read { path, start, end } => {
            emit(&workspace.read_file(&path, start, end).await?)?;
        }
        Commands::Create {
            path,
            content,
            encoding,
            parents,
        } => {
            let content = content_or_stdin(content)?;
            let outcome = workspace
                .create_file(&path, &content, encoding.map(Into::into), parents)
                .await?;
            emit(&outcome)?;
        }
        Commands::Write {
            path,
            content,
            encoding,
            parents,
        } => {
            let content = content_or_stdin(content)?;
            let outcome = workspace
                .write_file(&path, &content, encoding.map(Into::into), parents)
                .await?;
            emit(&outcome)?;
        }
        Commands::Append {
            path,
            content,
            newline,
        } => {
            let content = content_or_stdin(content)?;
            emit(&workspace.append_file(&path, &content, None, newline).await?)?;
        }
        Commands::Copy {
            source,
            dest,
            parents,
        } => {
            emit(&workspace.copy_path(&source, &dest, parents).await?)?;
        }
        Commands::Move {
            source,
            dest,
            parents,
        } => {
            emit(&workspace.move_path(&source, &dest, parents).await?)?;
        }
        Commands::Delete { path, no_backup } => {
            emit(&workspace.delete_path(&path, !no_backup).await?)?;
        }
        Commands::Insert {
            path,
            line,
            content,
        } => {
            let content = content_or_stdin(content)?;
            emit(&workspace.insert_lines(&path, line, &content).await?)?;
        }
        Commands::Replace {
            path,
            start,
            end,
            content,
        } => {
            let content = content_or_stdin(content)?;
            emit(&workspace.replace_lines(&path, start, end, &content).await?)?;
        }
        Commands::DeleteLines { path, start, end } => {
            emit(&workspace.delete_lines(&path, start, end).await?)?;
        }
        Commands::Search {
            pattern,
            path,
            content,
            case_sensitive,
            extensions,
            max,
        } => {
            let request = SearchRequest {
                pattern,
                path,
                include_content: content,
                case_sensitive,
                file_extensions: if extensions.is_empty() {
                    None
                } else {
                    Some(extensions)
                },
                max_results: max,
            };
            emit(&workspace.search(request).await?)?;
        }
        Commands::Tree { path, depth } => {
            emit(&workspace.structure(&path, depth).await?)?;
        }
        Commands::Ls { path } => {
            emit(&workspace.list_dir(&path).await?)?;
        }
        Commands::Info { path } => {
            emit(&workspace.file_info(&path).await?)?;
        }
        Commands::Run {
            command,
            args,
            cwd,
            timeout,
        } => {
            let request = CommandRequest {
                command,
                args,
                cwd,
                timeout_seconds: timeout,
            };
            let result = workspace.run_command(request).await?;
            let failed = result.timed_out || result.exit_code != Some(0);
            emit(&result)?;
            if failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn content_or_stdin(content: Option<String>) -> Result<String> {
    match content {
        Some(content) => Ok(content),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read content from stdin")?;
            Ok(buf)
        }
    }
}
