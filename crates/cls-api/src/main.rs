//! Text classification REST API server: /api/v1/classify, /api/v1/retrain.

use cls_api::active_model::{active_model_source, resolve_model_paths};
use cls_api::config::ServiceConfig;
use cls_api::server::{self, AppState};
use cls_jobs::JobRegistry;
use cls_ml::{Classifier, NdarrayToolkit};
use cls_trainer::TrainingOrchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env();

    let source = active_model_source(&config);
    let paths = resolve_model_paths(&config, source.as_ref());
    let classifier = match Classifier::load(&paths) {
        Ok(c) => {
            tracing::info!(model = %paths.model.display(), "classifier loaded");
            Some(Arc::new(c))
        }
        Err(e) => {
            tracing::warn!(model = %paths.model.display(), error = %e, "classifier not loaded; /api/v1/classify will fail until restart");
            None
        }
    };

    let registry = Arc::new(JobRegistry::new());
    let orchestrator = TrainingOrchestrator::new(
        registry.clone(),
        Arc::new(NdarrayToolkit::new()),
        config.orchestrator_config(),
    );
    let state = Arc::new(AppState {
        registry,
        orchestrator,
        classifier,
        api_key: config.api_key.clone(),
        max_body_bytes: config.max_body_bytes,
        allowed_origins: config.allowed_origins.clone(),
    });

    let app = server::router(state);
    let addr: SocketAddr = config.listen.parse()?;
    tracing::info!("classification API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down; in-flight training jobs are abandoned");
}
