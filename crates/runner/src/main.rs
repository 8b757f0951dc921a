mod cmd;

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "runner", version)]
struct Cli {
    /// Path to runner.yaml config file (defaults apply when omitted)
    #[arg(long, short, global = true, env = "RUNNER_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve POST /run over HTTP
    Serve(cmd::ServeArgs),
    /// Execute one source file and print its output
    Run(cmd::RunArgs),
    /// Verify toolchains and the base directory
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so `run` output on stdout stays clean
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if nix::unistd::getuid().is_root() {
        tracing::warn!("running as root: submitted programs inherit root privileges");
    }

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Command::Serve(args) => cmd::run_serve(config, args).await.map(|()| ExitCode::SUCCESS),
        Command::Run(args) => cmd::run_once(config, args).await,
        Command::Check => cmd::run_check(config).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
