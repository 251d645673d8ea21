use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

const MAX_FILE_READ_BYTES_CEILING: u64 = 64 * 1024 * 1024;
const MAX_SEARCH_RESULTS_CEILING: usize = 10_000;
const COMMAND_TIMEOUT_SECONDS_CEILING: u64 = 3_600;

/// Single-byte fallback used when a file is neither UTF-8 nor BOM-marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackEncoding {
    Latin1,
    #[serde(alias = "cp1252")]
    Windows1252,
}

/// Engine-wide limits and policy, supplied by the embedding layer.
///
/// Loaded from TOML and optionally overridden through `WORKBENCH_*`
/// environment variables; out-of-range values are clamped rather than
/// rejected so a bad override cannot disable the bounds entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub max_file_read_bytes: u64,
    pub max_search_results: usize,
    pub command_timeout_seconds: u64,
    pub backup_enabled: bool,
    pub default_encoding: FallbackEncoding,
    pub allowed_commands: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_file_read_bytes: 5 * 1024 * 1024,
            max_search_results: 100,
            command_timeout_seconds: 30,
            backup_enabled: true,
            default_encoding: FallbackEncoding::Windows1252,
            allowed_commands: default_allowed_commands(),
        }
    }
}

/// Development tools the command runner may invoke out of the box.
/// Policy lives in configuration; this is only the default set.
fn default_allowed_commands() -> BTreeSet<String> {
    [
        "git", "cargo", "rustc", "npm", "npx", "yarn", "pnpm", "node", "python", "python3", "pip",
        "go", "make", "mvn", "gradle", "dotnet", "flutter", "dart",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: EngineConfig =
            toml::from_str(raw).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.clamp();
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::from_io(e, path))?;
        Self::from_toml_str(&raw)
    }

    /// Apply `WORKBENCH_*` environment overrides on top of the loaded values.
    pub fn apply_env_overrides(&mut self) {
        self.max_file_read_bytes = parse_env_u64(
            std::env::var("WORKBENCH_MAX_FILE_READ_BYTES").ok().as_deref(),
            self.max_file_read_bytes,
        );
        self.max_search_results = parse_env_usize(
            std::env::var("WORKBENCH_MAX_SEARCH_RESULTS").ok().as_deref(),
            self.max_search_results,
        );
        self.command_timeout_seconds = parse_env_u64(
            std::env::var("WORKBENCH_COMMAND_TIMEOUT_SECONDS")
                .ok()
                .as_deref(),
            self.command_timeout_seconds,
        );
        if let Some(raw) = std::env::var("WORKBENCH_BACKUP_ENABLED").ok().as_deref() {
            if let Ok(value) = raw.trim().parse::<bool>() {
                self.backup_enabled = value;
            }
        }
        if let Some(raw) = std::env::var("WORKBENCH_ALLOWED_COMMANDS").ok().as_deref() {
            let parsed = parse_command_list(raw);
            if !parsed.is_empty() {
                self.allowed_commands = parsed;
            }
        }
        self.clamp();
    }

    pub fn is_command_allowed(&self, command: &str) -> bool {
        self.allowed_commands.contains(command)
    }

    fn clamp(&mut self) {
        self.max_file_read_bytes = self.max_file_read_bytes.clamp(1, MAX_FILE_READ_BYTES_CEILING);
        self.max_search_results = self.max_search_results.clamp(1, MAX_SEARCH_RESULTS_CEILING);
        self.command_timeout_seconds = self
            .command_timeout_seconds
            .clamp(1, COMMAND_TIMEOUT_SECONDS_CEILING);
    }
}

fn parse_env_u64(raw: Option<&str>, default_value: u64) -> u64 {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn parse_env_usize(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
}

fn parse_command_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
