//! Order info service.
//!
//! Consumes order messages from Kafka, stores them in `PostgreSQL`, and serves
//! them over HTTP through a local cache.
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run the service
//! cargo run --bin order-info-service
//! ```

use anyhow::Context;
use order_info_core::{MessageLog, OrderCache, OrderHandler, OrderRepository};
use order_info_postgres::{PostgresOrderRepository, SCHEMA, apply_schema};
use order_info_redpanda::RedpandaMessageLog;
use order_info_runtime::metrics::MetricsServer;
use order_info_runtime::{
    IngestionPipeline, LocalCache, OrderController, PersistAndCache, warm_up_cache,
};
use order_info_service::{AppState, Config, router};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,order_info=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        kafka = %config.kafka.bootstrap_servers,
        topic = %config.kafka.topic,
        address = %config.bind_address(),
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new();
    metrics.install().context("failed to install metrics recorder")?;

    let repo = PostgresOrderRepository::connect(
        &config.database.url,
        config.database.max_connections,
        Duration::from_secs(config.database.connect_timeout),
    )
    .await
    .context("failed to connect to database")?;

    let schema = load_schema(&config.database.schema_path).await;
    apply_schema(repo.pool(), &schema)
        .await
        .context("failed to apply database schema")?;

    let repo: Arc<dyn OrderRepository> = Arc::new(repo);
    let cache: Arc<dyn OrderCache> = Arc::new(LocalCache::new());
    let controller = Arc::new(OrderController::new(Arc::clone(&repo), Arc::clone(&cache)));

    let log: Arc<dyn MessageLog> = Arc::new(
        RedpandaMessageLog::builder()
            .brokers(&config.kafka.bootstrap_servers)
            .group_id(&config.kafka.group_id)
            .topic(&config.kafka.topic)
            .auto_offset_reset(&config.kafka.auto_offset_reset)
            .session_timeout(Duration::from_millis(config.kafka.session_timeout_ms))
            .heartbeat_interval(Duration::from_millis(config.kafka.heartbeat_interval_ms))
            .max_poll_interval(Duration::from_millis(config.kafka.max_poll_interval_ms))
            .build()
            .context("failed to subscribe to order topic")?,
    );

    match warm_up_cache(repo.as_ref(), cache.as_ref(), config.server.cache_warmup_limit).await {
        Ok(count) => info!(count, "Cache warmed up"),
        Err(e) => warn!(error = %e, "Cache warm-up failed, starting cold"),
    }

    let handler: Arc<dyn OrderHandler> =
        Arc::new(PersistAndCache::new(Arc::clone(&repo), Arc::clone(&cache)));
    let pipeline = Arc::new(IngestionPipeline::new(
        log,
        handler,
        config.pipeline_config(),
    ));

    let cancel = CancellationToken::new();
    let pipeline_task = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let cancel = cancel.clone();
        async move { pipeline.run(cancel).await }
    });

    let app = router(AppState::new(controller).with_metrics(metrics.handle().cloned()));
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    info!(address = %config.bind_address(), "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped, stopping ingestion");
    cancel.cancel();

    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(timeout, pipeline_task).await {
        Ok(Ok(())) => info!("Ingestion pipeline stopped"),
        Ok(Err(e)) => warn!(error = %e, "Ingestion task failed"),
        Err(_) => warn!(?timeout, "Ingestion shutdown timed out"),
    }

    if let Err(e) = pipeline.close() {
        warn!(error = %e, "Failed to close ingestion pipeline");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Schema SQL from `path`, or the embedded schema if the file is unreadable.
async fn load_schema(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(sql) => sql,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Schema file unreadable, using embedded schema");
            SCHEMA.to_string()
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
