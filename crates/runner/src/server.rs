use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sandbox::SandboxFactory;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::executor::{self, ExecutorConfig};
use crate::types::{ErrorResponse, ExecutionError, ExecutionResult, RunRequest, RunResponse};

const EXECUTION_FAILED_DETAILS: &str = "Code execution failed. Please check your code and try again.";
const INTERNAL_ERROR_DETAILS: &str = "The server could not run this request.";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    factory: Arc<dyn SandboxFactory>,
    executor: ExecutorConfig,
    permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        factory: Arc<dyn SandboxFactory>,
        executor: ExecutorConfig,
        max_concurrent: usize,
    ) -> Self {
        Self(Arc::new(Inner {
            factory,
            executor,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` resolves, letting in-flight executions finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> RunnerResult<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RunnerError::Server(e.to_string()))?;
    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn run_handler(
    State(state): State<AppState>,
    body: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let error = ExecutionError::InvalidRequest(rejection.body_text());
            return error_response(&error);
        }
    };

    // Closed only on shutdown, which never happens while the state is alive
    let Ok(permit) = Arc::clone(&state.0.permits).acquire_owned().await else {
        return error_response(&ExecutionError::InternalError);
    };

    // A disconnecting client drops this handler; the execution still runs to
    // completion so its sandbox is torn down and the permit released after it.
    let inner = Arc::clone(&state.0);
    let task = tokio::spawn(async move {
        let _permit = permit;
        executor::execute(inner.factory.as_ref(), request, &inner.executor).await
    });
    match task.await {
        Ok(result) => into_response(result),
        Err(e) => {
            error!(error = %e, "execution task failed");
            error_response(&ExecutionError::InternalError)
        }
    }
}

fn into_response(result: ExecutionResult) -> Response {
    match &result.error {
        None => (
            StatusCode::OK,
            Json(RunResponse {
                execution_time: result.execution_time(),
                output: result.stdout,
            }),
        )
            .into_response(),
        Some(error) => error_response(error),
    }
}

fn error_response(error: &ExecutionError) -> Response {
    let (status, details) = match error {
        ExecutionError::InvalidRequest(_) | ExecutionError::UnsupportedLanguage(_) => {
            (StatusCode::BAD_REQUEST, error.to_string())
        }
        ExecutionError::CompileError(_)
        | ExecutionError::RuntimeError(_)
        | ExecutionError::TimeoutError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            EXECUTION_FAILED_DETAILS.to_string(),
        ),
        ExecutionError::InternalError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_ERROR_DETAILS.to_string(),
        ),
    };
    let body = ErrorResponse {
        error: error.to_string(),
        kind: error.kind().to_string(),
        details,
    };
    (status, Json(body)).into_response()
}
