use std::time::Duration;

pub struct ExecRequest<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    /// Workspace file connected to the program's stdin; `None` means `/dev/null`.
    pub stdin_file: Option<&'a str>,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct ExecResult {
    pub pid: u32,
    /// Exit code, or `128 + signal` when the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
    /// Either stream produced more than the configured output limit.
    pub truncated: bool,
    /// An output pipe was still held open, by a process that left the group,
    /// when collection gave up; the captured output may be missing a tail.
    pub output_incomplete: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}
