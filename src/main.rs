use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use todo_sync::application::bootstrap::bootstrap_workspace;
use todo_sync::application::remote_sync::{RemoteSync, RetryPolicy};
use todo_sync::infrastructure::config::load_firebase_config_from_env;
use todo_sync::infrastructure::error::InfraError;
use todo_sync::infrastructure::firestore_client::ReqwestFirestoreClient;
use todo_sync::infrastructure::identity_client::ReqwestIdentityClient;
use todo_sync::server::{router, ServerState};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,todo_sync=debug"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .try_init();
}

fn workspace_root() -> Result<PathBuf, InfraError> {
    match std::env::var("TODO_WORKSPACE") {
        Ok(path) if !path.trim().is_empty() => Ok(PathBuf::from(path.trim())),
        _ => Ok(std::env::current_dir()?),
    }
}

#[tokio::main]
async fn main() -> Result<(), InfraError> {
    init_tracing();

    let bootstrap = bootstrap_workspace(&workspace_root()?)?;
    let app_config = bootstrap.app_config;
    let firebase = load_firebase_config_from_env()?;
    tracing::info!(
        app = %app_config.app_name,
        project = %firebase.project_id,
        database = %firebase.database_id,
        auth_domain = firebase.auth_domain.as_deref().unwrap_or("-"),
        "configuration loaded"
    );

    let remote = RemoteSync::new(Arc::new(ReqwestFirestoreClient::new(firebase.firestore())))
        .with_retry_policy(RetryPolicy {
            max_attempts: app_config.retry.max_attempts,
            base_delay_ms: app_config.retry.base_delay_ms,
        });
    let state = Arc::new(ServerState {
        remote,
        identity: Arc::new(ReqwestIdentityClient::new(firebase.identity())),
        admin_token: firebase.admin_token.clone(),
    });

    let address = SocketAddr::from(([0, 0, 0, 0], app_config.server_port));
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(%address, "server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
