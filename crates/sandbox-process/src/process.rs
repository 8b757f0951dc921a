use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::wait::{Id, WaitPidFlag, waitid};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::warn;

/// How long to wait for output pipes to close once the process group is dead.
/// Only a descendant that left the group can keep a pipe open past this.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Kill the entire process group led by `pgid` via `killpg(SIGKILL)`.
///
/// Requires the leader to have been spawned with `process_group(0)` so that its
/// PGID equals its PID. Errors are ignored: `ESRCH` just means the group is
/// already empty.
pub(crate) fn kill_process_group(pgid: u32) {
    if let Ok(pgid) = i32::try_from(pgid)
        && pgid > 0
    {
        let pgid = Pid::from_raw(pgid);
        let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
    }
}

/// Extract exit code from ExitStatus, mapping signals to 128 + signal number.
pub(crate) fn extract_exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| status.signal().map(|sig| 128 + sig).unwrap_or(1))
}

/// Bytes captured from one output stream.
#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub(crate) bytes: Vec<u8>,
    /// More than the limit was written; the excess was drained and dropped.
    pub(crate) truncated: bool,
    /// The pipe never reached EOF, so `bytes` may be missing a tail.
    pub(crate) incomplete: bool,
}

type SharedCapture = Arc<Mutex<Captured>>;

fn lock(capture: &SharedCapture) -> MutexGuard<'_, Captured> {
    capture.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read a stream to EOF into `capture`, keeping at most `limit` bytes.
///
/// The remainder is drained and discarded so the writer never blocks on a
/// full pipe. Bytes are published chunk by chunk, so whatever was read
/// survives an aborted reader.
async fn read_bounded<R>(mut reader: R, limit: usize, capture: SharedCapture) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let chunk = buf.get(..n).unwrap_or_default();
        let mut captured = lock(&capture);
        let room = limit.saturating_sub(captured.bytes.len());
        if chunk.len() > room {
            captured.truncated = true;
        }
        captured
            .bytes
            .extend_from_slice(chunk.get(..room.min(n)).unwrap_or_default());
    }
}

/// Background collector for one child output pipe.
pub(crate) struct OutputReader {
    stream: &'static str,
    capture: SharedCapture,
    handle: JoinHandle<std::io::Result<()>>,
}

impl OutputReader {
    pub(crate) fn spawn<R>(stream: &'static str, reader: R, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let capture = SharedCapture::default();
        let handle = tokio::spawn(read_bounded(reader, limit, Arc::clone(&capture)));
        Self {
            stream,
            capture,
            handle,
        }
    }

    /// Wait for EOF once the process group is dead.
    ///
    /// A descendant that left the group can hold the pipe open; after
    /// [`OUTPUT_DRAIN_TIMEOUT`] the reader is aborted and the bytes read so
    /// far are returned marked `incomplete`. Read failures are errors.
    pub(crate) async fn collect(self) -> std::io::Result<Captured> {
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, self.handle).await {
            Ok(joined) => joined.map_err(std::io::Error::other)??,
            Err(_) => {
                abort.abort();
                warn!(
                    stream = self.stream,
                    "output pipe still open after process exit, giving up"
                );
                lock(&self.capture).incomplete = true;
            }
        }
        Ok(std::mem::take(&mut *lock(&self.capture)))
    }
}

/// Block until `pid` has exited without reaping it.
///
/// While the leader is an unreaped zombie its PID, and so the process group
/// ID, cannot be recycled, which makes a following `killpg` safe.
pub(crate) fn wait_exited(pid: u32) -> nix::Result<()> {
    let pid = Pid::from_raw(i32::try_from(pid).map_err(|_| Errno::EINVAL)?);
    loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Err(Errno::EINTR) => continue,
            result => return result.map(drop),
        }
    }
}

/// Kills the process group when dropped unless [`GroupGuard::kill`] ran first.
///
/// Covers an `exec` future dropped mid-run: `kill_on_drop` only reaches the
/// leader, this reaches every process still in the group.
pub(crate) struct GroupGuard {
    pgid: u32,
    armed: bool,
}

impl GroupGuard {
    pub(crate) fn new(pgid: u32) -> Self {
        Self { pgid, armed: true }
    }

    pub(crate) fn kill(mut self) {
        kill_process_group(self.pgid);
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.armed {
            kill_process_group(self.pgid);
        }
    }
}
