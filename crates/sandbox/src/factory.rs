use async_trait::async_trait;

use crate::config::SandboxConfig;
use crate::error::Result;
use crate::sandbox::Sandbox;

#[async_trait]
pub trait SandboxFactory: Send + Sync {
    /// Human-readable name for this factory implementation (e.g. "process").
    fn name(&self) -> &str;
    /// Prepare factory-level resources and discard leftovers from a previous run.
    /// Must be called before serving traffic.
    async fn startup(&mut self) -> Result<()>;
    /// Create a new sandbox with its own, freshly allocated working area.
    async fn create(&self, config: SandboxConfig) -> Result<Box<dyn Sandbox>>;
    /// Tear down a sandbox and remove every artifact it created.
    ///
    /// Never fails: cleanup problems are logged so they cannot mask the
    /// outcome the caller is about to report.
    async fn destroy(&self, sandbox: Box<dyn Sandbox>);
}
