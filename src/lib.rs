pub mod blob;
pub mod cloud;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use blob::SnapshotVault;
use cloud::CloudClient;
use services::compliance::ComplianceWeights;
use services::locks::GroupLocks;
use services::mutation::MutationDeps;
use store::Store;

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cloud: Arc<dyn CloudClient>,
    pub vault: Arc<dyn SnapshotVault>,
    pub locks: GroupLocks,
    pub weights: ComplianceWeights,
    pub config: config::AppConfig,
}

impl AppState {
    /// Handles shared by the mutation paths.
    pub fn mutation_deps(&self) -> MutationDeps {
        MutationDeps {
            store: self.store.clone(),
            cloud: self.cloud.clone(),
            vault: self.vault.clone(),
            locks: self.locks.clone(),
        }
    }
}
