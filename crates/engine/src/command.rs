//! Allow-listed external command execution. Commands are spawned with an
//! argument vector (never through a shell), confined to a working
//! directory inside the root, and bounded by a timeout that kills the
//! whole process group so spawned children cannot orphan.

use crate::error::{EngineError, Result};
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

/// Cap on captured bytes per stream; the rest is drained and discarded so
/// the child never blocks on a full pipe.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    /// Bare program name; it must appear in the configured allow-list.
    /// Names containing path separators are rejected outright.
    pub command: String,
    pub args: Vec<String>,
    /// Working directory relative to the root; the root itself if absent.
    pub cwd: Option<String>,
    /// Seconds before the process group is killed; clamped to the
    /// configured `command_timeout_seconds`.
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    /// `None` when the process was killed (timeout or signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub elapsed_ms: u64,
    pub timed_out: bool,
}

impl Workspace {
    /// Run an allow-listed development command. A nonzero exit code is
    /// data for the caller, not a runner failure; only policy violations,
    /// confinement violations and spawn errors are `Err`.
    pub async fn run_command(&self, request: CommandRequest) -> Result<CommandResult> {
        let command = request.command.trim();
        if command.is_empty()
            || command.contains(['/', '\\'])
            || !self.config().is_command_allowed(command)
        {
            return Err(EngineError::CommandNotAllowed {
                command: request.command.clone(),
            });
        }

        let cwd = self.resolve_existing(request.cwd.as_deref().unwrap_or(""))?;
        if !cwd.absolute().is_dir() {
            return Err(EngineError::NotADirectory { path: cwd.display() });
        }

        let configured = self.config().command_timeout_seconds;
        let timeout_secs = request
            .timeout_seconds
            .unwrap_or(configured)
            .clamp(1, configured);

        let mut cmd = tokio::process::Command::new(command);
        cmd.args(&request.args)
            .current_dir(cwd.absolute())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        log::debug!(
            "running {command} {:?} in {} (timeout {timeout_secs}s)",
            request.args,
            cwd.display()
        );

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::from_io(e, std::path::Path::new(command)))?;

        let stdout_task = tokio::spawn(capture(child.stdout.take()));
        let stderr_task = tokio::spawn(capture(child.stderr.take()));

        let (exit_code, timed_out) =
            match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
                Ok(status) => {
                    let status = status.map_err(EngineError::Io)?;
                    (status.code(), false)
                }
                Err(_) => {
                    log::warn!("command {command} exceeded {timeout_secs}s, killing process group");
                    kill_process_group(&child);
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    (None, true)
                }
            };

        let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();

        Ok(CommandResult {
            command: command.to_string(),
            args: request.args,
            cwd: cwd.display(),
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            stdout_truncated,
            stderr_truncated,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            timed_out,
        })
    }
}

async fn capture<R>(reader: Option<R>) -> (Vec<u8>, bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };
    let mut captured = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if captured.len() < MAX_CAPTURE_BYTES {
                    let take = n.min(MAX_CAPTURE_BYTES - captured.len());
                    captured.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    // Keep draining so the child is never blocked on a full pipe.
                    truncated = true;
                }
            }
        }
    }
    (captured, truncated)
}

#[cfg(unix)]
fn kill_process_group(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        // The child was spawned as its own group leader, so this reaches
        // every process it spawned as well.
        unsafe {
            libc::killpg(pid as i32, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &tokio::process::Child) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn workspace_allowing(commands: &[&str]) -> (tempfile::TempDir, Workspace) {
        let temp = tempdir().unwrap();
        let config = EngineConfig {
            allowed_commands: commands.iter().map(|s| s.to_string()).collect(),
            ..EngineConfig::default()
        };
        let workspace = Workspace::with_root(temp.path(), config).unwrap();
        (temp, workspace)
    }

    fn request(command: &str, args: &[&str]) -> CommandRequest {
        CommandRequest {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            timeout_seconds: None,
        }
    }

    #[tokio::test]
    async fn disallowed_command_is_refused_before_spawn() {
        let (_temp, ws) = workspace_allowing(&["echo"]);
        let err = ws.run_command(request("rm", &["-rf", "/"])).await.unwrap_err();
        assert!(matches!(err, EngineError::CommandNotAllowed { .. }));
    }

    #[tokio::test]
    async fn path_shaped_names_are_refused() {
        let (_temp, ws) = workspace_allowing(&["echo"]);
        for name in ["/bin/echo", "bin/echo", "..\\echo", ""] {
            let err = ws.run_command(request(name, &[])).await.unwrap_err();
            assert!(matches!(err, EngineError::CommandNotAllowed { .. }), "{name}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let (_temp, ws) = workspace_allowing(&["echo"]);
        let result = ws.run_command(request("echo", &["hello"])).await.unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "hello\n");
        assert!(!result.timed_out);
        assert!(!result.stdout_truncated);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported_not_an_error() {
        let (_temp, ws) = workspace_allowing(&["false"]);
        let result = ws.run_command(request("false", &[])).await.unwrap();
        assert_eq!(result.exit_code, Some(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_process() {
        let (_temp, ws) = workspace_allowing(&["sleep"]);
        let mut req = request("sleep", &["30"]);
        req.timeout_seconds = Some(1);

        let start = std::time::Instant::now();
        let result = ws.run_command(req).await.unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        // Killed shortly after the deadline, nowhere near 30s.
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cwd_must_resolve_inside_the_root() {
        let (temp, ws) = workspace_allowing(&["pwd"]);
        std::fs::create_dir(temp.path().join("sub")).unwrap();

        let mut req = request("pwd", &[]);
        req.cwd = Some("sub".to_string());
        let result = ws.run_command(req).await.unwrap();
        assert!(result.stdout.trim_end().ends_with("/sub"));

        let mut req = request("pwd", &[]);
        req.cwd = Some("../elsewhere".to_string());
        let err = ws.run_command(req).await.unwrap_err();
        assert!(matches!(err, EngineError::OutsideRoot { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn metacharacters_are_inert_arguments() {
        let (_temp, ws) = workspace_allowing(&["echo"]);
        let result = ws
            .run_command(request("echo", &["$(whoami); rm -rf /"]))
            .await
            .unwrap();
        // Argv invocation: the argument arrives verbatim, nothing expands.
        assert_eq!(result.stdout, "$(whoami); rm -rf /\n");
    }
}
