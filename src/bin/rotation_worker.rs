use std::sync::Arc;

use anyhow::Result;
use listing_experiments::config::AppConfig;
use listing_experiments::publisher::marketplace::MarketplacePublisher;
use listing_experiments::publisher::mock::MockPublisher;
use listing_experiments::publisher::ListingPublisher;
use listing_experiments::service::experiment_service::ExperimentService;
use listing_experiments::service::rotation_scheduler::{RotationScheduler, SchedulerConfig};
use listing_experiments::store::postgres::PgExperimentStore;
use listing_experiments::store::ExperimentStore;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store: Arc<dyn ExperimentStore> = Arc::new(PgExperimentStore { pool });

    let publisher: Arc<dyn ListingPublisher> = if cfg.publisher_base_url.is_empty() {
        tracing::warn!("PUBLISHER_BASE_URL not set, publishing against the mock marketplace");
        Arc::new(MockPublisher::new("ALWAYS_SUCCESS"))
    } else {
        Arc::new(MarketplacePublisher {
            base_url: cfg.publisher_base_url.clone(),
            api_key: cfg.publisher_api_key.clone(),
            timeout_ms: cfg.publisher_timeout_ms,
            client: reqwest::Client::new(),
        })
    };

    let service = ExperimentService { store, publisher };
    let scheduler = RotationScheduler {
        service,
        config: SchedulerConfig {
            rotation_pass_secs: cfg.rotation_pass_secs,
            expiry_pass_secs: cfg.expiry_pass_secs,
        },
    };

    tracing::info!(
        "rotation worker started, rotation pass every {}s, expiry pass every {}s",
        cfg.rotation_pass_secs,
        cfg.expiry_pass_secs
    );
    scheduler.run().await;
    Ok(())
}
