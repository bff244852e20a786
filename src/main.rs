use std::sync::Arc;

use anyhow::Context;
use keepsake::{
    config::Config,
    retention::{setup_retention, RetentionJob},
    store::PostgresDocumentStore,
    SoftDeleteStore, SystemClock,
};
use sea_orm::{ConnectOptions, Database};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keepsake=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("Cannot load .env file");
        }
    }
    let config = Config::from_env()?;

    let db = Database::connect(
        ConnectOptions::from(config.database_url.as_str())
            .max_connections(config.max_connections)
            .to_owned(),
    )
    .await
    .context("could not connect to database_url")?;
    keepsake::migrate(&db).await?;

    let mut jobs = Vec::with_capacity(config.retention.len());
    for rule in config.retention {
        let Some(store) = PostgresDocumentStore::open(&db, &rule.collection)
            .await
            .with_context(|| format!("Cannot open collection {}", rule.collection))?
        else {
            warn!("Collection {} does not exist, no purge", rule.collection);
            continue;
        };
        info!(
            "Purging documents of {} {} days after deletion",
            rule.collection, rule.days
        );
        let span = tracing::info_span!("collection", name = %rule.collection);
        let documents = Arc::new(SoftDeleteStore::new(store, SystemClock, span));
        jobs.push(RetentionJob::new(rule, documents));
    }

    let retention = setup_retention(jobs, config.purge_interval);
    shutdown_signal().await;
    retention.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
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
