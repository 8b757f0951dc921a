use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Args;
use runner::config;
use runner::error::{RunnerError, RunnerResult};
use runner::executor::{self, ExecutorConfig};
use runner::types::RunRequest;
use sandbox_process::{ProcessConfig, ProcessFactory};

#[derive(Args)]
pub struct RunArgs {
    /// Source language (javascript, python, cpp, java)
    #[arg(long, short)]
    language: String,
    /// File fed to the program's stdin
    #[arg(long, short)]
    input: Option<PathBuf>,
    /// Source file to execute
    source: PathBuf,
}

/// Execute one program and report its outcome through the exit code.
///
/// Does not sweep the workspaces directory, so it is safe to use next to a
/// running server on the same base directory.
pub async fn run_once(config_path: Option<&Path>, args: RunArgs) -> RunnerResult<ExitCode> {
    let runner_config = config::load_or_default(config_path).await?;

    let code = read(&args.source).await?;
    let input = match &args.input {
        Some(path) => Some(read(path).await?),
        None => None,
    };

    let factory = ProcessFactory::new(ProcessConfig {
        base_dir: runner_config.base_dir.clone(),
    });
    let request = RunRequest {
        language: Some(args.language),
        code: Some(code),
        input,
    };
    let result = executor::execute(&factory, request, &ExecutorConfig::from(&runner_config)).await;

    match result.error {
        None => {
            println!("{}", result.stdout);
            Ok(ExitCode::SUCCESS)
        }
        Some(e) => {
            eprintln!("{}: {e}", e.kind());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn read(path: &Path) -> RunnerResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RunnerError::Config(format!("read {}: {e}", path.display())))
}
