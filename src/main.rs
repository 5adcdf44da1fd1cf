use std::path::PathBuf;
use std::process::ExitCode;

use studyplan::application::commands::AppState;
use tracing_subscriber::EnvFilter;

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env("STUDYPLAN_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn workspace_root() -> std::io::Result<PathBuf> {
    match std::env::var_os("STUDYPLAN_WORKSPACE") {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => std::env::current_dir(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter())
        .init();

    let state = match workspace_root()
        .map_err(Into::into)
        .and_then(AppState::new)
    {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(%error, "failed to initialize workspace");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("studyplan bridge starting");
    match studyplan::run(state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "studyplan bridge exited with error");
            ExitCode::FAILURE
        }
    }
}
