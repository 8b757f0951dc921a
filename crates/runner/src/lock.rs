use std::path::PathBuf;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{RunnerError, RunnerResult};

/// Take the exclusive lock on `path` without waiting.
///
/// Guards a base directory against a second server: startup sweeps stale
/// workspaces, which would delete the live ones of another instance. The
/// returned guard holds the lock until dropped.
pub async fn try_acquire(path: PathBuf) -> RunnerResult<Flock<std::fs::File>> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::options()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| RunnerError::Internal(format!("open lock {}: {e}", path.display())))?;
        Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_file, e)| match e {
            Errno::EWOULDBLOCK => RunnerError::Config(format!(
                "{} is in use by another runner",
                path.display()
            )),
            e => RunnerError::Internal(format!("flock {}: {e}", path.display())),
        })
    })
    .await
    .map_err(|e| RunnerError::Internal(format!("lock task: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_acquire_creates_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.lock");

        let guard = try_acquire(path.clone()).await.unwrap();
        assert!(path.exists());
        drop(guard);
    }

    #[tokio::test]
    async fn held_lock_rejects_second_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.lock");

        let _guard = try_acquire(path.clone()).await.unwrap();

        let err = try_acquire(path).await.unwrap_err();
        assert!(matches!(err, RunnerError::Config(_)));
        assert!(err.to_string().contains("in use"), "got: {err}");
    }

    #[tokio::test]
    async fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.lock");

        let guard = try_acquire(path.clone()).await.unwrap();
        drop(guard);

        let _again = try_acquire(path).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_path_returns_error() {
        let path = PathBuf::from("/nonexistent/dir/runner.lock");
        let err = try_acquire(path).await.unwrap_err();
        assert!(matches!(err, RunnerError::Internal(_)));
    }
}
