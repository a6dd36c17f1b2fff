use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use nsguard::blob::FsVault;
use nsguard::cloud::ArmClient;
use nsguard::config::AppConfig;
use nsguard::services::compliance::ComplianceWeights;
use nsguard::services::locks::GroupLocks;
use nsguard::store::PgStore;
use nsguard::AppState;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nsguard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let pool = nsguard::db::create_pool(&config.database_url, config.database_max_connections)
        .await?;
    nsguard::db::run_migrations(&pool).await?;

    let cloud = ArmClient::new(
        &config.cloud_api_base_url,
        &config.cloud_subscription_id,
        config.cloud_tenant_id.clone(),
        &config.cloud_api_token,
        Duration::from_secs(config.cloud_api_timeout_secs),
    )
    .map_err(|e| anyhow::anyhow!("cloud client setup failed: {e}"))?;

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        cloud: Arc::new(cloud),
        vault: Arc::new(FsVault::new(&config.snapshot_vault_dir)),
        locks: GroupLocks::new(),
        weights: ComplianceWeights {
            full: 1.0,
            partial: config.compliance_partial_credit,
        },
        config: config.clone(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(host = %addr, "Starting nsguard API server");

    let app = nsguard::routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
