use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub cloud_api_base_url: String,
    pub cloud_api_token: String,
    pub cloud_subscription_id: String,
    pub cloud_tenant_id: Option<String>,
    pub cloud_api_timeout_secs: u64,
    pub snapshot_vault_dir: String,
    pub compliance_partial_credit: f32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("BACKEND_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            cloud_api_base_url: env::var("CLOUD_API_BASE_URL")?,
            cloud_api_token: env::var("CLOUD_API_TOKEN")?,
            cloud_subscription_id: env::var("CLOUD_SUBSCRIPTION_ID")?,
            cloud_tenant_id: env::var("CLOUD_TENANT_ID").ok(),
            cloud_api_timeout_secs: env::var("CLOUD_API_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            snapshot_vault_dir: env::var("SNAPSHOT_VAULT_DIR")
                .unwrap_or_else(|_| "./snapshots".to_string()),
            compliance_partial_credit: env::var("COMPLIANCE_PARTIAL_CREDIT")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()
                .unwrap_or(0.5),
        })
    }
}
