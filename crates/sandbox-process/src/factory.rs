use async_trait::async_trait;
use sandbox::{Sandbox, SandboxConfig, SandboxError, SandboxFactory};
use tracing::{debug, info, warn};

use crate::config::ProcessConfig;
use crate::paths::{FactoryPaths, SandboxPaths};
use crate::sandbox::ProcessSandbox;

pub struct ProcessFactory {
    config: ProcessConfig,
    factory_paths: FactoryPaths,
}

impl ProcessFactory {
    /// Create a new factory. Nothing is touched on disk until `startup()` or
    /// the first `create()`.
    pub fn new(config: ProcessConfig) -> Self {
        let factory_paths = FactoryPaths::new(config.base_dir.clone());
        Self {
            config,
            factory_paths,
        }
    }

    pub fn paths(&self) -> &FactoryPaths {
        &self.factory_paths
    }
}

#[async_trait]
impl SandboxFactory for ProcessFactory {
    fn name(&self) -> &str {
        "process"
    }

    async fn startup(&mut self) -> sandbox::Result<()> {
        let workspaces = self.factory_paths.workspaces();
        tokio::fs::create_dir_all(&workspaces).await.map_err(|e| {
            SandboxError::CreationFailed(format!("mkdir {}: {e}", workspaces.display()))
        })?;

        // Workspaces left behind by a crashed process are never reused.
        let mut swept = 0usize;
        let mut entries = tokio::fs::read_dir(&workspaces).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let removed = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match removed {
                Ok(()) => swept += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale workspace"),
            }
        }

        info!(
            base_dir = %self.config.base_dir.display(),
            swept,
            "factory started"
        );
        Ok(())
    }

    async fn create(&self, config: SandboxConfig) -> sandbox::Result<Box<dyn Sandbox>> {
        let id = config.id.to_string();
        let paths = SandboxPaths::new(self.factory_paths.workspace(&id));

        tokio::fs::create_dir_all(self.factory_paths.workspaces())
            .await
            .map_err(|e| SandboxError::CreationFailed(format!("mkdir workspaces: {e}")))?;
        // `create_dir` (not `_all`) fails on an existing directory, so a
        // workspace is never shared between two sandboxes.
        tokio::fs::create_dir(paths.workspace())
            .await
            .map_err(|e| SandboxError::CreationFailed(format!("mkdir workspace: {e}")))?;

        debug!(id = %id, workspace = %paths.workspace().display(), "sandbox created");

        Ok(Box::new(ProcessSandbox::new(
            id,
            paths,
            config.limits.max_output_bytes,
        )))
    }

    async fn destroy(&self, sandbox: Box<dyn Sandbox>) {
        let workspace = sandbox.workspace();
        if !workspace.starts_with(self.factory_paths.workspaces()) {
            warn!(
                id = %sandbox.id(),
                workspace = %workspace.display(),
                "refusing to remove workspace outside base_dir"
            );
            return;
        }
        match tokio::fs::remove_dir_all(workspace).await {
            Ok(()) => debug!(id = %sandbox.id(), "sandbox destroyed"),
            Err(e) => warn!(id = %sandbox.id(), error = %e, "failed to remove workspace"),
        }
    }
}
