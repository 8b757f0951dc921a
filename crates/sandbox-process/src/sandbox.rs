use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use sandbox::{ExecRequest, ExecResult, Sandbox, SandboxError};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::paths::SandboxPaths;
use crate::process::{Captured, GroupGuard, OutputReader, extract_exit_code, wait_exited};

/// A sandbox backed by a private directory and plain child processes.
///
/// Every program runs as the service's own user with no resource isolation.
/// The only guarantees are a private working directory and that the whole
/// process group is gone when [`Sandbox::exec`] returns.
pub struct ProcessSandbox {
    /// Cached `config.id.to_string()`.
    pub(crate) id: String,
    pub(crate) paths: SandboxPaths,
    max_output_bytes: usize,
}

impl ProcessSandbox {
    pub(crate) fn new(id: String, paths: SandboxPaths, max_output_bytes: usize) -> Self {
        Self {
            id,
            paths,
            max_output_bytes,
        }
    }

    async fn stdin_for(&self, stdin_file: Option<&str>) -> sandbox::Result<Stdio> {
        let Some(name) = stdin_file else {
            return Ok(Stdio::null());
        };
        let file = tokio::fs::File::open(self.paths.file(name)?)
            .await
            .map_err(|e| SandboxError::ExecFailed(format!("open stdin {name}: {e}")))?;
        Ok(Stdio::from(file.into_std().await))
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn workspace(&self) -> &Path {
        self.paths.workspace()
    }

    async fn write_file(&self, name: &str, content: &[u8]) -> sandbox::Result<()> {
        let path = self.paths.file(name)?;
        tokio::fs::write(&path, content).await?;
        debug!(id = %self.id, file = name, size = content.len(), "wrote file");
        Ok(())
    }

    async fn exec(&self, request: &ExecRequest<'_>) -> sandbox::Result<ExecResult> {
        let stdin = self.stdin_for(request.stdin_file).await?;

        // New process group so the whole tree can be killed on timeout.
        let mut child = Command::new(request.program)
            .args(request.args)
            .current_dir(self.paths.workspace())
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::SpawnFailed(format!("{}: {e}", request.program)))?;

        let Some(pid) = child.id() else {
            return Err(SandboxError::ExecFailed(format!(
                "{}: no pid after spawn",
                request.program
            )));
        };
        debug!(
            id = %self.id,
            pid,
            program = request.program,
            timeout_ms = request.timeout.as_millis() as u64,
            "spawned"
        );

        // Dropping this future mid-run kills the whole group.
        let guard = GroupGuard::new(pid);

        let limit = self.max_output_bytes;
        let stdout = child
            .stdout
            .take()
            .map(|s| OutputReader::spawn("stdout", s, limit));
        let stderr = child
            .stderr
            .take()
            .map(|s| OutputReader::spawn("stderr", s, limit));

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + request.timeout;
        let watcher = tokio::task::spawn_blocking(move || wait_exited(pid));
        let exited = async {
            watcher
                .await
                .map_err(std::io::Error::other)?
                .map_err(std::io::Error::from)
        };
        let timed_out = match tokio::time::timeout_at(deadline, exited).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!(id = %self.id, pid, error = %e, "exit watch failed, reaping directly");
                tokio::time::timeout_at(deadline, child.wait()).await.is_err()
            }
            Err(_) => true,
        };
        if timed_out {
            warn!(
                id = %self.id,
                pid,
                program = request.program,
                "deadline elapsed, killing process group"
            );
        }
        // The leader is not reaped yet, so its group id cannot have been
        // recycled. Descendants that outlived it belong to this execution too.
        guard.kill();
        let status = child.wait().await?;
        let elapsed = started.elapsed();

        let stdout = collect(stdout).await?;
        let stderr = collect(stderr).await?;

        let result = ExecResult {
            pid,
            exit_code: extract_exit_code(status),
            stdout: stdout.bytes,
            stderr: stderr.bytes,
            timed_out,
            truncated: stdout.truncated || stderr.truncated,
            output_incomplete: stdout.incomplete || stderr.incomplete,
        };
        info!(
            id = %self.id,
            pid,
            program = request.program,
            exit_code = result.exit_code,
            timed_out,
            truncated = result.truncated,
            output_incomplete = result.output_incomplete,
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "exec finished"
        );
        Ok(result)
    }
}

async fn collect(reader: Option<OutputReader>) -> sandbox::Result<Captured> {
    match reader {
        Some(reader) => reader
            .collect()
            .await
            .map_err(|e| SandboxError::ExecFailed(format!("read output: {e}"))),
        None => Ok(Captured::default()),
    }
}

/// Removes the workspace if the sandbox is dropped without being destroyed,
/// e.g. when the execution future is cancelled.
impl Drop for ProcessSandbox {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(self.paths.workspace()) {
            Ok(()) => debug!(id = %self.id, "removed workspace of dropped sandbox"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(id = %self.id, error = %e, "failed to remove workspace"),
        }
    }
}
