//! Shell commands run as supervised subprocesses.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::error::{ExecutionError, ExecutionStatus};
use super::runner::{ActionOutcome, RunningAction, ToolRunner};
use crate::permissions::ToolInvocationRequest;

const MAX_OUTPUT: usize = 30_000;

/// Runs the request's `command` with `bash -c`.
///
/// On Unix the command gets its own process group so termination also
/// reaches anything it started.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    working_dir: Option<PathBuf>,
    max_output: usize,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: "bash".to_string(),
            working_dir: None,
            max_output: MAX_OUTPUT,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn max_output(mut self, chars: usize) -> Self {
        self.max_output = chars;
        self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRunner for ShellRunner {
    async fn spawn(
        &self,
        request: &ToolInvocationRequest,
    ) -> Result<Box<dyn RunningAction>, ExecutionError> {
        let command = request
            .input()
            .get("command")
            .and_then(Value::as_str)
            .or_else(|| request.rule_content())
            .ok_or_else(|| ExecutionError::spawn_failed(request.tool_name(), "missing command"))?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutionError::spawn_failed(request.tool_name(), e))?;
        let pid = child.id();
        tracing::debug!(pid, tool = %request.tool_name(), "Spawned shell command");

        Ok(Box::new(ShellAction {
            stdout: Pipe::spawn(child.stdout.take()),
            stderr: Pipe::spawn(child.stderr.take()),
            child,
            pid,
            status: None,
            settled: false,
            max_output: self.max_output,
        }))
    }
}

struct ShellAction {
    child: Child,
    pid: Option<u32>,
    stdout: Pipe,
    stderr: Pipe,
    status: Option<ExitStatus>,
    settled: bool,
    max_output: usize,
}

impl ShellAction {
    /// Signals every member of the command's process group. The group
    /// outlives the leader while a backgrounded child is still running.
    fn kill_group(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            kill_process_group(pid);
        }
    }
}

#[async_trait]
impl RunningAction for ShellAction {
    async fn wait(&mut self) -> ActionOutcome {
        let status = match self.status {
            Some(status) => status,
            None => match self.child.wait().await {
                Ok(status) => {
                    self.status = Some(status);
                    status
                }
                Err(e) => return ActionOutcome::failure(format!("Failed to wait for command: {}", e), None),
            },
        };

        let stdout = self.stdout.collect().await.to_string();
        let stderr = self.stderr.collect().await;
        self.settled = true;
        let code = status.code();
        ActionOutcome {
            output: format_output(&stdout, stderr, code, self.max_output),
            status: ExecutionStatus::from_exit_code(code),
        }
    }

    async fn terminate(&mut self, grace: Duration) -> Result<(), String> {
        if self.settled {
            return Ok(());
        }

        // The leader may already be reaped while group members still hold
        // the output pipes.
        self.kill_group();
        if self.status.is_some() {
            self.stdout.abort();
            self.stderr.abort();
            self.settled = true;
            return Ok(());
        }
        // Errors here mean the child already exited; the wait below settles it.
        let _ = self.child.start_kill();

        let result = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.status = Some(status);
                self.settled = true;
                Ok(())
            }
            Ok(Err(e)) => Err(format!("Failed to reap process: {}", e)),
            Err(_) => Err(format!(
                "process {} still running {}ms after kill",
                self.pid.map_or_else(|| "?".to_string(), |p| p.to_string()),
                grace.as_millis()
            )),
        };
        self.stdout.abort();
        self.stderr.abort();
        result
    }
}

impl Drop for ShellAction {
    fn drop(&mut self) {
        if !self.settled {
            self.kill_group();
        }
        self.stdout.abort();
        self.stderr.abort();
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use rustix::process::{Pid, Signal};

    let Some(pgid) = i32::try_from(pid).ok().and_then(Pid::from_raw) else {
        return;
    };
    if let Err(e) = rustix::process::kill_process_group(pgid, Signal::KILL) {
        tracing::debug!(pid, error = %e, "Failed to signal process group");
    }
}

/// Output pipe drained on a background task.
struct Pipe {
    task: Option<JoinHandle<String>>,
    text: String,
}

impl Pipe {
    fn spawn<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let task = reader.map(|mut reader| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = reader.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });
        Self {
            task,
            text: String::new(),
        }
    }

    async fn collect(&mut self) -> &str {
        if let Some(task) = self.task.as_mut() {
            self.text = task.await.unwrap_or_default();
            self.task = None;
        }
        &self.text
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn format_output(stdout: &str, stderr: &str, exit_code: Option<i32>, max_output: usize) -> String {
    let mut combined = String::new();
    combined.push_str(stdout);
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push_str("\n--- stderr ---\n");
        }
        combined.push_str(stderr);
    }

    if combined.len() > max_output {
        let mut end = max_output;
        while !combined.is_char_boundary(end) {
            end -= 1;
        }
        combined.truncate(end);
        combined.push_str("\n... (output truncated)");
    }

    if combined.is_empty() {
        combined = "(no output)".to_string();
    }

    match exit_code {
        Some(0) => combined,
        Some(code) => format!("Exit code: {}\n{}", code, combined),
        None => format!("Terminated by signal\n{}", combined),
    }
}
