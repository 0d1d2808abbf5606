use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ProcessError, Result};

/// How long stderr may stay open after the child has exited
const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// A fully formed command line plus how to supervise it
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Short name used in logs and reports ("lip-sync", "ffmpeg concat", ...)
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.timeout = secs.map(Duration::from_secs);
        self
    }

    /// The command line as it would be typed in a shell, for logging only
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(|a| a.as_os_str()))
            .map(|part| {
                let part = part.to_string_lossy();
                if part.contains(char::is_whitespace) {
                    format!("'{}'", part)
                } else {
                    part.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Program name as shown in errors
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// What happened to a child that ran to completion
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub success: bool,
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
    /// Last lines the child wrote to stderr
    pub stderr_tail: Vec<String>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl ProcessOutcome {
    /// One-line description of a failed run, for stage reports
    pub fn failure_reason(&self, label: &str) -> String {
        let code = self
            .exit_code
            .map(|c| format!("exit code {}", c))
            .unwrap_or_else(|| "terminated by signal".to_string());

        match self.stderr_tail.last() {
            Some(last) => format!("{} failed with {}: {}", label, code, last),
            None => format!("{} failed with {}", label, code),
        }
    }
}

/// Runs external commands, streaming their stderr into the log
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    stderr_tail_lines: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(20)
    }
}

impl ProcessRunner {
    pub fn new(stderr_tail_lines: usize) -> Self {
        Self { stderr_tail_lines }
    }

    /// Run the command and wait for it to exit.
    ///
    /// stdout is inherited. stderr is forwarded to the log at DEBUG level
    /// and its last lines are kept in the outcome.
    pub async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutcome> {
        info!("Running {}: {}", spec.label, spec.command_line());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| ProcessError::SpawnFailed {
            program: spec.program_name(),
            reason: e.to_string(),
        })?;

        let stderr = child.stderr.take();
        let label = spec.label.clone();
        let keep = self.stderr_tail_lines;
        let tail = Arc::new(Mutex::new(VecDeque::<String>::with_capacity(keep)));
        let shared_tail = Arc::clone(&tail);
        let mut reader = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                            if line.is_empty() {
                                continue;
                            }
                            debug!(tool = %label, "{}", line);
                            if keep > 0 {
                                let mut tail = shared_tail.lock().await;
                                if tail.len() == keep {
                                    tail.pop_front();
                                }
                                tail.push_back(line);
                            }
                        }
                    }
                }
            }
        });

        let waited = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!("{} exceeded {}s, killing it", spec.label, limit.as_secs());
                    let _ = child.kill().await;
                    reader.abort();
                    return Err(ProcessError::TimedOut {
                        program: spec.program_name(),
                        secs: limit.as_secs(),
                    }
                    .into());
                }
            },
            None => child.wait().await,
        };

        let status = waited.map_err(|e| ProcessError::WaitFailed {
            program: spec.program_name(),
            reason: e.to_string(),
        })?;

        // A grandchild that inherited stderr can hold the pipe open long after the child exits
        if tokio::time::timeout(STDERR_DRAIN_GRACE, &mut reader).await.is_err() {
            debug!("{} left stderr open after exiting, not waiting for it", spec.label);
            reader.abort();
        }
        let stderr_tail = Vec::from(std::mem::take(&mut *tail.lock().await));

        let outcome = ProcessOutcome {
            success: status.success(),
            exit_code: status.code(),
            stderr_tail,
            elapsed: started.elapsed(),
        };

        if outcome.success {
            debug!("{} finished in {:.1}s", spec.label, outcome.elapsed.as_secs_f64());
        } else {
            warn!("{}", outcome.failure_reason(&spec.label));
        }

        Ok(outcome)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::DubbingError;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("test", "sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_successful_command() {
        let runner = ProcessRunner::default();
        let outcome = runner.run(&sh("exit 0")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_an_outcome() {
        let runner = ProcessRunner::default();
        let outcome = runner.run(&sh("echo boom >&2; exit 3")).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr_tail, vec!["boom".to_string()]);
        assert!(outcome.failure_reason("test").contains("exit code 3: boom"));
    }

    #[tokio::test]
    async fn test_stderr_tail_is_bounded() {
        let runner = ProcessRunner::new(2);
        let outcome = runner
            .run(&sh("for i in 1 2 3 4 5; do echo line$i >&2; done"))
            .await
            .unwrap();
        assert_eq!(outcome.stderr_tail, vec!["line4".to_string(), "line5".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let runner = ProcessRunner::default();
        let spec = CommandSpec::new("ghost", "/nonexistent/tool-binary");
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, DubbingError::Process(ProcessError::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let runner = ProcessRunner::default();
        let mut spec = sh("sleep 5");
        spec.timeout = Some(Duration::from_millis(100));

        let started = Instant::now();
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, DubbingError::Process(ProcessError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_background_grandchild_does_not_block() {
        let runner = ProcessRunner::default();

        let started = Instant::now();
        let outcome = runner
            .run(&sh("sleep 5 & echo early >&2; exit 0"))
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(outcome.stderr_tail, vec!["early".to_string()]);
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let spec = CommandSpec::new("x", "ffmpeg").args(["-i", "my clip.mp4"]);
        assert_eq!(spec.command_line(), "ffmpeg -i 'my clip.mp4'");
    }
}
