use std::path::Path;

use sandbox::SandboxError;

/// Verify that the process backend can run on this host.
///
/// Checks that every command in `commands` resolves on `PATH` and that
/// `base_dir` can be created and written to. Collects all failures and
/// returns them in a single `BackendNotAvailable` error.
pub async fn check_prerequisites(base_dir: &Path, commands: &[&str]) -> Result<(), SandboxError> {
    let mut errors = Vec::new();

    check_required_commands(commands, &mut errors);
    check_base_dir(base_dir, &mut errors).await;

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SandboxError::BackendNotAvailable(errors.join("; ")))
    }
}

fn check_required_commands(commands: &[&str], errors: &mut Vec<String>) {
    for cmd in commands {
        if which::which(cmd).is_err() {
            errors.push(format!("required command not found: {cmd}"));
        }
    }
}

async fn check_base_dir(base_dir: &Path, errors: &mut Vec<String>) {
    if let Err(e) = tokio::fs::create_dir_all(base_dir).await {
        errors.push(format!("cannot create {}: {e}", base_dir.display()));
        return;
    }
    let probe = base_dir.join(format!(".probe-{}", uuid::Uuid::new_v4()));
    if let Err(e) = tokio::fs::write(&probe, b"").await {
        errors.push(format!("{} is not writable: {e}", base_dir.display()));
        return;
    }
    let _ = tokio::fs::remove_file(&probe).await;
}
