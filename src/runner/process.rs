//! Subprocess execution of `ansible-playbook`.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::ExecutionError;

use super::cancel::CancelToken;
use super::command::PlaybookInvocation;

/// Output of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

/// Boundary between the lifecycle adapter and the external process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybookRunner: Send + Sync {
    /// Runs the invocation to completion.
    ///
    /// Resolves to an error on non-zero exit, launch failure, cancellation
    /// or timeout; never to success after the process was terminated.
    async fn run(
        &self,
        invocation: &PlaybookInvocation,
        cancel: &CancelToken,
    ) -> Result<ExecutionOutput, ExecutionError>;
}

/// Runs playbooks as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlaybookRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &PlaybookInvocation,
        cancel: &CancelToken,
    ) -> Result<ExecutionOutput, ExecutionError> {
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        info!("Running: {}", invocation.display());
        let started = Instant::now();

        let mut command = Command::new(&invocation.binary);
        command
            .args(invocation.args())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ExecutionError::Launch {
            binary: invocation.binary.clone(),
            source,
        })?;

        let stdin_task = match (child.stdin.take(), invocation.stdin.clone()) {
            (Some(mut pipe), Some(payload)) => Some(tokio::spawn(async move {
                pipe.write_all(payload.as_bytes()).await?;
                pipe.shutdown().await
            })),
            _ => None,
        };
        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        // Background processes left by the child can hold the pipes open.
        let mut pipe_tasks = vec![stdout_task.abort_handle(), stderr_task.abort_handle()];
        if let Some(task) = &stdin_task {
            pipe_tasks.push(task.abort_handle());
        }

        let deadline = async {
            match invocation.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        let timeout_secs = invocation.timeout.map_or(0, |limit| limit.as_secs());

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| ExecutionError::Io {
                message: format!("failed to wait for process: {e}"),
            })?,
            () = cancel.cancelled() => {
                warn!("Cancelling run of {}", invocation.playbook);
                terminate(&mut child).await;
                abort_all(&pipe_tasks);
                return Err(ExecutionError::Cancelled);
            }
            () = &mut deadline => {
                warn!("Run of {} exceeded {}s, terminating", invocation.playbook, timeout_secs);
                terminate(&mut child).await;
                abort_all(&pipe_tasks);
                return Err(ExecutionError::TimedOut { secs: timeout_secs });
            }
        };

        let output = async {
            if let Some(task) = stdin_task {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("Inventory not fully consumed from stdin: {e}"),
                    Err(e) => debug!("Stdin writer task failed: {e}"),
                }
            }
            let stdout = collect(stdout_task).await?;
            let stderr = collect(stderr_task).await?;
            Ok::<_, ExecutionError>((stdout, stderr))
        };

        let (stdout, stderr) = tokio::select! {
            output = output => output?,
            () = cancel.cancelled() => {
                warn!("Cancelling run of {} while its output is still open", invocation.playbook);
                abort_all(&pipe_tasks);
                return Err(ExecutionError::Cancelled);
            }
            () = &mut deadline => {
                warn!(
                    "Run of {} exceeded {}s while its output is still open",
                    invocation.playbook, timeout_secs
                );
                abort_all(&pipe_tasks);
                return Err(ExecutionError::TimedOut { secs: timeout_secs });
            }
        };
        let duration = started.elapsed();

        info!("ansible play output: {stdout}");

        if !status.success() {
            return Err(ExecutionError::Failed { status, stderr });
        }

        if !stderr.trim().is_empty() {
            debug!("ansible play stderr: {stderr}");
        }
        debug!("Run of {} finished in {:?}", invocation.playbook, duration);

        Ok(ExecutionOutput {
            stdout,
            stderr,
            duration,
        })
    }
}

/// Reads a pipe to its end.
async fn read_pipe<R>(pipe: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

/// Awaits a reader task and decodes its buffer.
async fn collect(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<String, ExecutionError> {
    let bytes = task
        .await
        .map_err(|e| ExecutionError::Io {
            message: format!("output reader failed: {e}"),
        })?
        .map_err(|e| ExecutionError::Io {
            message: format!("failed to read process output: {e}"),
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn abort_all(tasks: &[AbortHandle]) {
    for task in tasks {
        task.abort();
    }
}

/// Kills the child and reaps it.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to terminate ansible-playbook: {e}");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::runner::CancelSource;
    use tempfile::TempDir;

    /// Uses `/bin/sh` as the binary so the "playbook" is a shell script.
    fn script(dir: &TempDir, body: &str) -> PlaybookInvocation {
        let path = dir.path().join("playbook.sh");
        std::fs::write(&path, body).expect("Failed to write script");
        PlaybookInvocation::new("/bin/sh", path.display().to_string(), "inventory.yml")
    }

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let invocation = script(&dir, "echo \"ran with $1 $2\"\n");

        let output = ProcessRunner::new()
            .run(&invocation, &CancelToken::never())
            .await
            .expect("run should succeed");

        assert_eq!(output.stdout, "ran with -i inventory.yml\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let invocation = script(&dir, "echo 'TASK failed: unreachable' >&2\nexit 3\n");

        let err = ProcessRunner::new()
            .run(&invocation, &CancelToken::never())
            .await
            .expect_err("run should fail");

        match err {
            ExecutionError::Failed { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "TASK failed: unreachable\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let invocation =
            PlaybookInvocation::new("/nonexistent/ansible-playbook", "site.yml", "inventory.yml");

        let err = ProcessRunner::new()
            .run(&invocation, &CancelToken::never())
            .await
            .expect_err("launch should fail");

        assert!(matches!(err, ExecutionError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_stdin_inventory_is_streamed() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let invocation = script(&dir, "cat\n").with_stdin(Some(String::from("all:\n  hosts: {}\n")));

        let output = ProcessRunner::new()
            .run(&invocation, &CancelToken::never())
            .await
            .expect("run should succeed");

        assert_eq!(output.stdout, "all:\n  hosts: {}\n");
    }

    #[tokio::test]
    async fn test_cancel_terminates_process() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let invocation = script(&dir, "exec sleep 30\n");
        let source = CancelSource::new();
        let token = source.token();

        let handle = tokio::spawn(async move { ProcessRunner::new().run(&invocation, &token).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        source.cancel();

        let result = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("cancelled run should return promptly")
            .expect("task should not panic");
        assert!(matches!(result, Err(ExecutionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_launches() {
        let source = CancelSource::new();
        source.cancel();
        let invocation =
            PlaybookInvocation::new("/nonexistent/ansible-playbook", "site.yml", "inventory.yml");

        let result = ProcessRunner::new().run(&invocation, &source.token()).await;
        assert!(matches!(result, Err(ExecutionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_timeout_terminates_process() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let invocation = script(&dir, "exec sleep 30\n").with_timeout(Some(Duration::from_millis(200)));

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            ProcessRunner::new().run(&invocation, &CancelToken::never()),
        )
        .await
        .expect("timed out run should return promptly");

        assert!(matches!(result, Err(ExecutionError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_cancel_while_background_process_holds_output() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let invocation = script(&dir, "sleep 20 &\nexit 0\n");
        let source = CancelSource::new();
        let token = source.token();

        let handle = tokio::spawn(async move { ProcessRunner::new().run(&invocation, &token).await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        source.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("cancelled run should return promptly")
            .expect("task should not panic");
        assert!(matches!(result, Err(ExecutionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_timeout_while_background_process_holds_output() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let invocation =
            script(&dir, "sleep 20 &\nexit 0\n").with_timeout(Some(Duration::from_millis(300)));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            ProcessRunner::new().run(&invocation, &CancelToken::never()),
        )
        .await
        .expect("timed out run should return promptly");

        assert!(matches!(result, Err(ExecutionError::TimedOut { .. })));
    }
}
