mod api;
mod router;
mod static_assets;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Context;
use crewgate_core::{AppCore, CrewgateConfig};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing logger
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crewgate_server=debug,crewgate_core=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Crewgate backend server");

    let config = CrewgateConfig::load().context("loading crewgate configuration")?;
    let addr = config.bind_addr();
    let core = Arc::new(AppCore::new(config).context("initializing app core")?);

    let app = router::build_router(core);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Crewgate running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl-c received; shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}
