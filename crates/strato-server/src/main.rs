//! Strato orchestrator entry point.

use std::sync::Arc;
use tracing::info;

use strato_config::Settings;
use strato_server::{AppContext, StaticTokenVerifier, build_router, init_telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let _log_guard = init_telemetry(&settings.log_base_dir)?;

    info!(
        profile = %settings.profile,
        bind = %settings.bind_addr,
        workers = settings.worker_count,
        "starting strato orchestrator"
    );

    std::fs::create_dir_all(&settings.temp_upload_dir)?;
    std::fs::create_dir_all(&settings.temp_artifact_dir)?;

    let verifier = Arc::new(StaticTokenVerifier::from_env());
    let app = AppContext::build(settings.clone(), verifier).await?;
    app.spawn_background();

    let router = build_router(Arc::clone(&app));
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!(addr = %settings.bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
