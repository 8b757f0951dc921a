use std::path::Path;
use std::process::ExitCode;

use runner::config;
use runner::error::RunnerResult;
use runner::language::Language;

/// Print which languages this host can run and whether the base directory is usable.
pub async fn run_check(config_path: Option<&Path>) -> RunnerResult<ExitCode> {
    let runner_config = config::load_or_default(config_path).await?;
    let mut ok = true;

    for language in Language::ALL {
        let missing: Vec<&str> = runner_config
            .toolchains
            .commands_for(language)
            .into_iter()
            .filter(|cmd| which::which(cmd).is_err())
            .collect();
        if missing.is_empty() {
            println!("[ok]      {language}");
        } else {
            ok = false;
            println!("[missing] {language}: {}", missing.join(", "));
        }
    }

    match sandbox_process::check_prerequisites(&runner_config.base_dir, &[]).await {
        Ok(()) => println!("[ok]      base_dir {}", runner_config.base_dir.display()),
        Err(e) => {
            ok = false;
            println!("[error]   {e}");
        }
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
