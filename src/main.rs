use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dripfeed::config::{ConfigError, ServerConfig};
use dripfeed::fixtures;

#[derive(Debug, Error)]
enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("fixture provisioning failed: {0}")]
    Provision(std::io::Error),
    #[error("server failed: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), BootError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    let config = Arc::new(config);

    fixtures::provision(&config)
        .await
        .map_err(BootError::Provision)?;
    info!(files_dir = %config.files_dir.display(), "fixtures provisioned");

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(BootError::Serve)?;
    info!(port = config.port, "listening");

    let app = dripfeed::app(config).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).await.map_err(BootError::Serve)?;

    Ok(())
}
