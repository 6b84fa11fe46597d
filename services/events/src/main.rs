use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::settings::Settings;
use events::{
    middleware::JwtVerifier,
    routes,
    state::AppState,
    storage::{self, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting events service");

    let settings = Settings::load()?;
    if settings.auth.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set");
    }

    // Open the configured storage backend
    let backend = storage::connect(&settings).await?;
    let storage = Storage::new(backend, settings.storage.operation_timeout());
    let backend_name = storage.backend().backend_name();
    if storage.health_check().await? {
        info!(backend = backend_name, "Storage connection successful");
    } else {
        anyhow::bail!("Failed to reach the {backend_name} storage backend");
    }

    let app_state = AppState::new(storage.clone(), JwtVerifier::new(&settings.auth.jwt_secret));
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&settings.server.bind_addr).await?;
    info!("Events service listening on {}", settings.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, closing storage");
    storage.close().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
