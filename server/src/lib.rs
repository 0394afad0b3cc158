pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod health;
pub mod telemetry;

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub use api::{router, AppState};
pub use auth::CurrentUser;
pub use cli::{Cli, Commands, ServeArgs};
pub use config::{ConfigError, ServerConfig};
pub use container::{
    cleanup_container, detect_runtime, health_check_container, start_container,
    verify_image_exists, ContainerError, ContainerHandle, ContainerRuntime, RunConfig,
};
pub use error::{ApiError, ApiResult};
pub use health::{probe, wait_until_healthy, HealthError, HealthReport};

use model::{AuthResult, Authenticator, InMemoryStore};

/// Application state backed by a fresh in-memory store.
pub fn build_state(config: &ServerConfig) -> AuthResult<AppState> {
    let auth = Authenticator::new(config.auth.clone())?;
    Ok(AppState::new(Arc::new(InMemoryStore::new()), auth))
}

/// Serves the API on an already bound listener until `shutdown` resolves.
pub async fn serve_on<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, store = state.store.store_name(), "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("server stopped");
    Ok(())
}

/// Binds the configured address and serves until Ctrl-C or SIGTERM.
pub async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config)?;
    let listener = TcpListener::bind(config.socket_addr()).await?;
    serve_on(listener, state, shutdown_signal()).await?;
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
