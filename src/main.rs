use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use dossier_backend::core::config::{AppPaths, Settings};
use dossier_backend::logging;
use dossier_backend::server;
use dossier_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let paths = AppPaths::new();
    logging::init(&paths);

    let state = AppState::initialize(settings, paths).await?;

    let bind_addr = format!("0.0.0.0:{}", state.settings.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let app: Router = server::router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
