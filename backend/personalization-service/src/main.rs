use anyhow::{Context, Result};
use personalization_service::backend::{BackendDataService, NoopBackend, RestBackend};
use personalization_service::jobs::{Clock, SystemClock};
use personalization_service::models::Product;
use personalization_service::storage::{LocalStore, MemoryLocalStore, RedisLocalStore};
use personalization_service::{Config, PersonalizationSession, ResourceMonitor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Upper bound on how long the loop sleeps between scheduler polls
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load config
    let config = Config::from_env().context("Failed to load config")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    config.validate()?;

    let user_id = config
        .user_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(service = %config.service_name, user_id = %user_id, "Starting personalization session");

    // Local Persistent Store
    let store: Arc<dyn LocalStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("Invalid Redis URL")?;
            info!("Using Redis local store");
            Arc::new(RedisLocalStore::new(client, &config.store_key_prefix, &user_id))
        }
        None => {
            warn!("REDIS_URL not set, state will not survive restarts");
            Arc::new(MemoryLocalStore::new())
        }
    };

    // Backend Data Service
    let backend: Arc<dyn BackendDataService> = match RestBackend::from_config(&config) {
        Some(backend) => {
            info!("Behavior sync and model upload enabled");
            Arc::new(backend)
        }
        None => {
            warn!("BACKEND_URL not set, running without remote sync");
            Arc::new(NoopBackend)
        }
    };

    let sampler = Arc::new(ResourceMonitor::new(&config).with_store(store.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let catalog = match &config.catalog_path {
        Some(path) => Some(load_catalog(path).await?),
        None => None,
    };

    let session = PersonalizationSession::new(config, user_id, store, backend, sampler, clock.clone());
    session.start().await;

    if let Some(products) = catalog {
        let slate = session.set_catalog(products).await;
        info!(recommended = slate.items.len(), "Catalog loaded");
    }

    loop {
        let wait = session
            .next_deadline()
            .await
            .and_then(|deadline| (deadline - clock.now()).to_std().ok())
            .unwrap_or_default()
            .min(MAX_POLL_INTERVAL);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let ran = session.run_due_tasks().await;
                if !ran.is_empty() {
                    info!(tasks = ?ran, "Periodic tasks complete");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Err(e) = session.persist_classifier().await {
        warn!(error = %e, "Failed to persist classifier on shutdown");
    }

    info!("Personalization session stopped");
    Ok(())
}

async fn load_catalog(path: &str) -> Result<Vec<Product>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read catalog {}", path))?;
    let products: Vec<Product> =
        serde_json::from_str(&raw).with_context(|| format!("Malformed catalog {}", path))?;
    Ok(products)
}
