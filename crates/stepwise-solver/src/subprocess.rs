//! Tool subprocesses with wall-clock timeout and cancellation.
//!
//! Each invocation runs on its own current-thread tokio runtime so callers in
//! a rayon pool can stay synchronous. Output goes to a log file inside the
//! branch workspace.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use stepwise_core::CancelToken;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{ExitCode, SolverError, SolverResult};

const CANCEL_POLL: Duration = Duration::from_millis(200);
const LOG_TAIL_LINES: usize = 20;

/// Locate a tool binary.
///
/// Search order:
/// 1. `~/.stepwise/bin/<name>`
/// 2. System PATH
pub fn find_binary(name: &str) -> SolverResult<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        let local = home.join(".stepwise").join("bin").join(name);
        if local.is_file() {
            return Ok(local);
        }
    }
    which::which(name).map_err(|_| SolverError::NotInstalled {
        binary: name.to_string(),
        hint: format!("install {name} or add it to PATH"),
    })
}

/// One external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolProcess {
    program: PathBuf,
    /// Zero disables the timeout.
    timeout_seconds: u64,
}

impl ToolProcess {
    pub fn new(program: impl Into<PathBuf>, timeout_seconds: u64) -> Self {
        Self {
            program: program.into(),
            timeout_seconds,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Run `args` in `cwd`, logging stdout and stderr to `log`.
    ///
    /// The child is killed on timeout or cancellation. A non-zero exit is a
    /// [`SolverError::ProcessFailed`] carrying the tail of the log.
    pub fn run(&self, args: &[String], cwd: &Path, log: &Path, cancel: &CancelToken) -> SolverResult<()> {
        if cancel.is_cancelled() {
            return Err(SolverError::Cancelled { program: self.name() });
        }
        if let Some(parent) = log.parent() {
            fs::create_dir_all(parent)?;
        }
        let log_file = File::create(log)?;
        let stdout = Stdio::from(log_file.try_clone()?);

        // Child processes must be spawned inside the runtime that reaps them.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let status = runtime.block_on(async {
            let child = Command::new(&self.program)
                .args(args)
                .current_dir(cwd)
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(Stdio::from(log_file))
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| SolverError::ProcessStart {
                    program: self.name(),
                    source,
                })?;
            debug!(program = %self.program.display(), ?args, cwd = %cwd.display(), "spawned tool");
            self.wait(child, cancel).await
        })?;

        let exit_code = ExitCode::from_raw(status.code());
        if exit_code.is_success() {
            return Ok(());
        }
        Err(SolverError::ProcessFailed {
            program: self.name(),
            exit_code,
            message: log_tail(log),
        })
    }

    async fn wait(&self, mut child: Child, cancel: &CancelToken) -> SolverResult<ExitStatus> {
        let limit = (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds));
        let deadline = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        let mut poll = tokio::time::interval(CANCEL_POLL);

        loop {
            tokio::select! {
                status = child.wait() => return Ok(status?),
                _ = &mut deadline => {
                    warn!(program = %self.program.display(), seconds = self.timeout_seconds, "tool timed out, killing");
                    let _ = child.kill().await;
                    return Err(SolverError::Timeout {
                        program: self.name(),
                        seconds: self.timeout_seconds,
                    });
                }
                _ = poll.tick() => {
                    if cancel.is_cancelled() {
                        warn!(program = %self.program.display(), "run cancelled, killing tool");
                        let _ = child.kill().await;
                        return Err(SolverError::Cancelled { program: self.name() });
                    }
                }
            }
        }
    }
}

fn log_tail(log: &Path) -> String {
    let text = fs::read_to_string(log).unwrap_or_default();
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn successful_run_writes_log() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("logs/tool.log");
        ToolProcess::new("sh", 10)
            .run(&sh("echo solved"), dir.path(), &log, &CancelToken::new())
            .unwrap();
        assert!(fs::read_to_string(&log).unwrap().contains("solved"));
    }

    #[test]
    fn failure_reports_exit_code_and_log_tail() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("tool.log");
        let err = ToolProcess::new("sh", 10)
            .run(&sh("echo broken deck >&2; exit 3"), dir.path(), &log, &CancelToken::new())
            .unwrap_err();
        match err {
            SolverError::ProcessFailed { exit_code, message, .. } => {
                assert_eq!(exit_code, ExitCode::Failure(3));
                assert!(message.contains("broken deck"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn timeout_kills_process() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("tool.log");
        let err = ToolProcess::new("sh", 1)
            .run(&sh("sleep 30"), dir.path(), &log, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, SolverError::Timeout { seconds: 1, .. }));
    }

    #[test]
    fn cancelled_token_stops_before_spawn() {
        let dir = tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = ToolProcess::new("sh", 0)
            .run(&sh("echo never"), dir.path(), &dir.path().join("tool.log"), &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn cancel_during_run_kills_process() {
        let dir = tempdir().unwrap();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let err = ToolProcess::new("sh", 0)
            .run(&sh("sleep 30"), dir.path(), &dir.path().join("tool.log"), &cancel)
            .unwrap_err();
        canceller.join().unwrap();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_binary_is_not_installed() {
        assert!(matches!(
            find_binary("stepwise-no-such-tool"),
            Err(SolverError::NotInstalled { .. })
        ));
    }
}
