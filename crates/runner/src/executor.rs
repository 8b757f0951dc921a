use std::time::Duration;

use sandbox::{
    ExecRequest, ExecResult, ResourceLimits, Sandbox, SandboxConfig, SandboxError, SandboxFactory,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{RunnerConfig, ToolchainConfig};
use crate::language::{Language, Step};
use crate::types::{ExecutionError, ExecutionResult, RunRequest};

/// Workspace file holding the program's stdin.
pub const INPUT_FILE: &str = "input.txt";

/// Settings shared by every execution.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub run_timeout: Duration,
    pub compile_timeout: Duration,
    pub max_output_bytes: usize,
    pub toolchains: ToolchainConfig,
}

impl From<&RunnerConfig> for ExecutorConfig {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            run_timeout: config.execution.run_timeout(),
            compile_timeout: config.execution.compile_timeout(),
            max_output_bytes: config.execution.max_output_bytes,
            toolchains: config.toolchains.clone(),
        }
    }
}

/// Compile (if needed) and run one program, returning its output.
///
/// Never fails: every outcome, including infrastructure failures, is folded
/// into the returned [`ExecutionResult`]. Requests are validated before the
/// filesystem is touched, and once a sandbox exists it is destroyed on every
/// path, removing all artifacts. If this future is dropped mid-run, the
/// sandbox's own drop handling kills the process group and removes the
/// workspace.
pub async fn execute(
    factory: &dyn SandboxFactory,
    request: RunRequest,
    config: &ExecutorConfig,
) -> ExecutionResult {
    let (language, code, input) = match validate(request) {
        Ok(valid) => valid,
        Err(e) => {
            info!(kind = e.kind(), error = %e, "request rejected");
            return ExecutionResult::failure(e, config.run_timeout);
        }
    };

    let id = Uuid::new_v4();
    info!(
        id = %id,
        language = %language,
        code_len = code.len(),
        input_len = input.len(),
        "execution started"
    );

    match execute_inner(factory, id, language, &code, &input, config).await {
        Ok(stdout) => {
            info!(id = %id, stdout_len = stdout.len(), "execution succeeded");
            ExecutionResult::success(stdout, config.run_timeout)
        }
        Err(e) => {
            info!(id = %id, kind = e.kind(), "execution failed");
            ExecutionResult::failure(e, config.run_timeout)
        }
    }
}

fn validate(request: RunRequest) -> Result<(Language, String, String), ExecutionError> {
    let language = request.language.filter(|l| !l.is_empty());
    let code = request.code.filter(|c| !c.is_empty());
    let (Some(language), Some(code)) = (language, code) else {
        return Err(ExecutionError::InvalidRequest(
            "Language and code are required.".into(),
        ));
    };
    let language = language.parse::<Language>()?;
    Ok((language, code, request.input.unwrap_or_default()))
}

async fn execute_inner(
    factory: &dyn SandboxFactory,
    id: Uuid,
    language: Language,
    code: &str,
    input: &str,
    config: &ExecutorConfig,
) -> Result<String, ExecutionError> {
    let sandbox_config = SandboxConfig {
        id,
        limits: ResourceLimits {
            max_output_bytes: config.max_output_bytes,
        },
    };
    let sandbox = factory
        .create(sandbox_config)
        .await
        .map_err(|e| internal(id, "create sandbox", &e))?;

    // Run, then destroy regardless of outcome
    let result = run_in_sandbox(sandbox.as_ref(), id, language, code, input, config).await;
    factory.destroy(sandbox).await;

    result
}

async fn run_in_sandbox(
    sandbox: &dyn Sandbox,
    id: Uuid,
    language: Language,
    code: &str,
    input: &str,
    config: &ExecutorConfig,
) -> Result<String, ExecutionError> {
    // 1. Materialize stdin and source
    let plan = language.plan(code, sandbox.workspace(), &config.toolchains);
    sandbox
        .write_file(INPUT_FILE, input.as_bytes())
        .await
        .map_err(|e| internal(id, "write input", &e))?;
    sandbox
        .write_file(&plan.source_file, code.as_bytes())
        .await
        .map_err(|e| internal(id, "write source", &e))?;

    // 2. Build
    if let Some(build) = &plan.build {
        compile(sandbox, id, build, config.compile_timeout).await?;
    }

    // 3. Run against the input file
    let result = sandbox
        .exec(&ExecRequest {
            program: &plan.run.program,
            args: &plan.run.args,
            stdin_file: Some(INPUT_FILE),
            timeout: config.run_timeout,
        })
        .await
        .map_err(|e| internal(id, "run program", &e))?;

    if result.timed_out {
        return Err(ExecutionError::TimeoutError);
    }
    if result.truncated {
        return Err(ExecutionError::RuntimeError(format!(
            "Output exceeded the limit of {} bytes",
            config.max_output_bytes
        )));
    }
    if result.exit_code != 0 {
        return Err(ExecutionError::RuntimeError(failure_message(
            &result,
            "Process exited with code",
        )));
    }
    if result.output_incomplete {
        return Err(ExecutionError::RuntimeError(
            "Output was not fully collected: a background process kept it open".into(),
        ));
    }

    Ok(String::from_utf8_lossy(&result.stdout).trim().to_string())
}

/// Run the build step. Every failure, including a missing compiler, is
/// reported as a compile error and the run step is never attempted.
async fn compile(
    sandbox: &dyn Sandbox,
    id: Uuid,
    build: &Step,
    timeout: Duration,
) -> Result<(), ExecutionError> {
    let result = sandbox
        .exec(&ExecRequest {
            program: &build.program,
            args: &build.args,
            stdin_file: None,
            timeout,
        })
        .await
        .map_err(|e| {
            warn!(id = %id, program = %build.program, error = %e, "compiler did not start");
            ExecutionError::CompileError(format!("Failed to start compiler: {e}"))
        })?;

    if result.timed_out {
        return Err(ExecutionError::CompileError(format!(
            "Compilation timed out after {} seconds",
            timeout.as_secs_f64()
        )));
    }
    if result.exit_code != 0 {
        return Err(ExecutionError::CompileError(failure_message(
            &result,
            "Compiler exited with code",
        )));
    }
    Ok(())
}

/// Captured stderr, or a generic message naming the exit code when it is empty.
fn failure_message(result: &ExecResult, fallback: &str) -> String {
    let stderr = String::from_utf8_lossy(&result.stderr);
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        format!("{fallback} {}", result.exit_code)
    } else {
        stderr.to_string()
    }
}

fn internal(id: Uuid, stage: &str, e: &SandboxError) -> ExecutionError {
    error!(id = %id, stage, error = %e, "execution infrastructure failure");
    ExecutionError::InternalError
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Scripted sandbox: records calls and replays canned exec results.
    struct FakeSandbox {
        workspace: PathBuf,
        fail_write: bool,
        results: Mutex<Vec<sandbox::Result<ExecResult>>>,
        calls: std::sync::Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Sandbox for FakeSandbox {
        fn id(&self) -> &str {
            "fake"
        }

        fn workspace(&self) -> &Path {
            &self.workspace
        }

        async fn write_file(&self, name: &str, _content: &[u8]) -> sandbox::Result<()> {
            self.calls.lock().unwrap().push(format!("write {name}"));
            if self.fail_write {
                return Err(SandboxError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }

        async fn exec(&self, request: &ExecRequest<'_>) -> sandbox::Result<ExecResult> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("exec {}", request.program));
            self.results.lock().unwrap().remove(0)
        }
    }

    struct FakeFactory {
        fail_create: bool,
        fail_write: bool,
        results: Mutex<Option<Vec<sandbox::Result<ExecResult>>>>,
        calls: std::sync::Arc<Mutex<Vec<String>>>,
        created: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl FakeFactory {
        fn new(results: Vec<sandbox::Result<ExecResult>>) -> Self {
            Self {
                fail_create: false,
                fail_write: false,
                results: Mutex::new(Some(results)),
                calls: Default::default(),
                created: AtomicUsize::new(0),
                destroyed: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SandboxFactory for FakeFactory {
        fn name(&self) -> &str {
            "fake"
        }

        async fn startup(&mut self) -> sandbox::Result<()> {
            Ok(())
        }

        async fn create(&self, _config: SandboxConfig) -> sandbox::Result<Box<dyn Sandbox>> {
            if self.fail_create {
                return Err(SandboxError::CreationFailed("no space".into()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSandbox {
                workspace: PathBuf::from("/fake/ws"),
                fail_write: self.fail_write,
                results: Mutex::new(self.results.lock().unwrap().take().unwrap_or_default()),
                calls: std::sync::Arc::clone(&self.calls),
            }))
        }

        async fn destroy(&self, _sandbox: Box<dyn Sandbox>) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn exit(exit_code: i32, stdout: &str, stderr: &str) -> sandbox::Result<ExecResult> {
        Ok(ExecResult {
            pid: 1,
            exit_code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            timed_out: false,
            truncated: false,
            output_incomplete: false,
        })
    }

    fn timed_out() -> sandbox::Result<ExecResult> {
        Ok(ExecResult {
            pid: 1,
            exit_code: 137,
            stdout: Vec::new(),
            stderr: Vec::new(),
            timed_out: true,
            truncated: false,
            output_incomplete: false,
        })
    }

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            run_timeout: Duration::from_secs(10),
            compile_timeout: Duration::from_secs(30),
            max_output_bytes: 1024,
            toolchains: ToolchainConfig::default(),
        }
    }

    fn request(language: &str, code: &str, input: Option<&str>) -> RunRequest {
        RunRequest {
            language: Some(language.into()),
            code: Some(code.into()),
            input: input.map(Into::into),
        }
    }

    #[tokio::test]
    async fn success_trims_stdout() {
        let factory = FakeFactory::new(vec![exit(0, "  3\n\n", "")]);
        let result = execute(&factory, request("python", "print(3)", Some("1 2")), &config()).await;

        assert!(result.succeeded());
        assert_eq!(result.stdout, "3");
        assert_eq!(result.time_limit, Duration::from_secs(10));
        assert_eq!(
            factory.calls(),
            vec!["write input.txt", "write code.py", "exec python3"]
        );
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_fields_are_invalid_without_sandbox() {
        let factory = FakeFactory::new(Vec::new());
        for req in [
            RunRequest::default(),
            RunRequest {
                language: Some("python".into()),
                code: Some(String::new()),
                input: None,
            },
            RunRequest {
                language: None,
                code: Some("print(1)".into()),
                input: None,
            },
        ] {
            let result = execute(&factory, req, &config()).await;
            assert_eq!(result.error_kind(), Some("InvalidRequest"));
        }
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_language_never_creates_sandbox() {
        let factory = FakeFactory::new(Vec::new());
        let result = execute(&factory, request("ruby", "puts 1", None), &config()).await;

        assert_eq!(
            result.error,
            Some(ExecutionError::UnsupportedLanguage("ruby".into()))
        );
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
        assert!(factory.calls().is_empty());
    }

    #[tokio::test]
    async fn compile_failure_skips_run_and_cleans_up() {
        let factory = FakeFactory::new(vec![exit(1, "", "code.cpp:1:1: error: expected ';'\n")]);
        let result = execute(&factory, request("cpp", "int main() {", None), &config()).await;

        assert_eq!(
            result.error,
            Some(ExecutionError::CompileError(
                "code.cpp:1:1: error: expected ';'".into()
            ))
        );
        assert_eq!(
            factory.calls(),
            vec!["write input.txt", "write code.cpp", "exec g++"]
        );
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compiler_spawn_failure_is_compile_error() {
        let factory = FakeFactory::new(vec![Err(SandboxError::SpawnFailed(
            "javac: not found".into(),
        ))]);
        let result = execute(&factory, request("java", "class X {}", None), &config()).await;

        assert_eq!(result.error_kind(), Some("CompileError"));
        assert!(result.error_message().unwrap().contains("javac: not found"));
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compile_timeout_is_compile_error() {
        let factory = FakeFactory::new(vec![timed_out()]);
        let result = execute(&factory, request("cpp", "int main(){}", None), &config()).await;

        assert_eq!(result.error_kind(), Some("CompileError"));
        assert!(result.error_message().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn java_runs_detected_class_after_compiling() {
        let factory = FakeFactory::new(vec![exit(0, "", ""), exit(0, "hi\n", "")]);
        let src = "public class Greeter { public static void main(String[] a) {} }";
        let result = execute(&factory, request("java", src, None), &config()).await;

        assert!(result.succeeded());
        assert_eq!(result.stdout, "hi");
        assert_eq!(
            factory.calls(),
            vec![
                "write input.txt",
                "write Greeter.java",
                "exec javac",
                "exec java"
            ]
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_runtime_error_with_stderr() {
        let factory = FakeFactory::new(vec![exit(1, "partial", "Traceback: boom\n")]);
        let result = execute(&factory, request("python", "raise x", None), &config()).await;

        assert_eq!(
            result.error,
            Some(ExecutionError::RuntimeError("Traceback: boom".into()))
        );
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_without_stderr_names_exit_code() {
        let factory = FakeFactory::new(vec![exit(7, "", "")]);
        let result = execute(&factory, request("javascript", "process.exit(7)", None), &config()).await;

        assert_eq!(
            result.error,
            Some(ExecutionError::RuntimeError("Process exited with code 7".into()))
        );
    }

    #[tokio::test]
    async fn run_timeout_is_timeout_error() {
        let factory = FakeFactory::new(vec![timed_out()]);
        let result = execute(&factory, request("python", "while True: pass", None), &config()).await;

        assert_eq!(result.error, Some(ExecutionError::TimeoutError));
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn truncated_output_is_runtime_error() {
        let mut truncated = exit(0, "yyyy", "").unwrap();
        truncated.truncated = true;
        let factory = FakeFactory::new(vec![Ok(truncated)]);
        let result = execute(&factory, request("python", "print('y'*10**9)", None), &config()).await;

        assert_eq!(result.error_kind(), Some("RuntimeError"));
        assert!(result.error_message().unwrap().contains("1024 bytes"));
    }

    #[tokio::test]
    async fn incomplete_output_is_runtime_error_not_success() {
        let mut partial = exit(0, "42\n", "").unwrap();
        partial.output_incomplete = true;
        let factory = FakeFactory::new(vec![Ok(partial)]);
        let result = execute(&factory, request("python", "print(42)", None), &config()).await;

        assert!(!result.succeeded());
        assert_eq!(result.error_kind(), Some("RuntimeError"));
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn output_read_failure_is_internal_error() {
        let factory = FakeFactory::new(vec![Err(SandboxError::ExecFailed(
            "read output: broken pipe".into(),
        ))]);
        let result = execute(&factory, request("python", "print(1)", None), &config()).await;

        assert_eq!(result.error, Some(ExecutionError::InternalError));
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_failure_is_internal_error() {
        let mut factory = FakeFactory::new(Vec::new());
        factory.fail_create = true;
        let result = execute(&factory, request("python", "print(1)", None), &config()).await;

        assert_eq!(result.error, Some(ExecutionError::InternalError));
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn write_failure_is_internal_error_and_still_destroys() {
        let mut factory = FakeFactory::new(Vec::new());
        factory.fail_write = true;
        let result = execute(&factory, request("python", "print(1)", None), &config()).await;

        assert_eq!(result.error, Some(ExecutionError::InternalError));
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(factory.calls(), vec!["write input.txt"]);
    }

    #[tokio::test]
    async fn run_spawn_failure_is_internal_error() {
        let factory = FakeFactory::new(vec![Err(SandboxError::SpawnFailed("node: not found".into()))]);
        let result = execute(&factory, request("javascript", "1", None), &config()).await;

        assert_eq!(result.error, Some(ExecutionError::InternalError));
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
    }
}
