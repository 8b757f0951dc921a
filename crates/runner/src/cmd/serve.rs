use std::path::Path;
use std::sync::Arc;

use clap::Args;
use runner::config;
use runner::error::{RunnerError, RunnerResult};
use runner::executor::ExecutorConfig;
use runner::lock;
use runner::server::{self, AppState};
use sandbox::SandboxFactory;
use sandbox_process::{ProcessConfig, ProcessFactory};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides config)
    #[arg(long, env = "RUNNER_LISTEN")]
    listen: Option<String>,
}

/// Load config, prepare the base directory and serve until shutdown.
pub async fn run_serve(config_path: Option<&Path>, args: ServeArgs) -> RunnerResult<()> {
    let mut runner_config = config::load_or_default(config_path).await?;
    if let Some(listen) = args.listen {
        runner_config.listen = listen;
    }
    let addr = runner_config.listen_addr()?;

    tokio::fs::create_dir_all(&runner_config.base_dir)
        .await
        .map_err(|e| {
            RunnerError::Config(format!(
                "create base_dir {}: {e}",
                runner_config.base_dir.display()
            ))
        })?;

    // Held for the lifetime of the server
    let _lock = lock::try_acquire(runner_config.base_dir.join("runner.lock")).await?;

    // Missing toolchains only disable their languages
    if let Err(e) = sandbox_process::check_prerequisites(
        &runner_config.base_dir,
        &runner_config.toolchains.all_commands(),
    )
    .await
    {
        warn!(error = %e, "prerequisites incomplete");
    }

    let mut factory = ProcessFactory::new(ProcessConfig {
        base_dir: runner_config.base_dir.clone(),
    });
    factory.startup().await?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RunnerError::Server(format!("bind {addr}: {e}")))?;

    info!(
        base_dir = %runner_config.base_dir.display(),
        factory = factory.name(),
        max_concurrent = runner_config.execution.max_concurrent,
        run_timeout_ms = runner_config.execution.run_timeout_ms,
        "runner ready"
    );

    let state = AppState::new(
        Arc::new(factory),
        ExecutorConfig::from(&runner_config),
        runner_config.execution.max_concurrent,
    );
    server::serve(listener, state, server::shutdown_signal()).await
}
