use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecRequest, ExecResult};

#[async_trait]
pub trait Sandbox: Send + Sync {
    // -- identity --
    fn id(&self) -> &str;
    /// Directory owned exclusively by this sandbox. Every file written through
    /// the sandbox lives directly beneath it.
    fn workspace(&self) -> &Path;

    // -- operations --
    /// Write `content` to `name` inside the workspace. `name` must be a single
    /// file name, not a path.
    async fn write_file(&self, name: &str, content: &[u8]) -> Result<()>;
    /// Run a program to completion or until `request.timeout` elapses.
    ///
    /// A non-zero exit or a timeout is reported in [`ExecResult`]; only
    /// failures to start the program are returned as errors.
    async fn exec(&self, request: &ExecRequest<'_>) -> Result<ExecResult>;
}
