//! Per-group mutual exclusion for the snapshot/apply/commit sequence.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Hands out one async mutex per external id, created on first use.
/// Writers hold the guard across the whole snapshot/apply/commit sequence,
/// so two mutations of the same group serialize while unrelated groups
/// never contend.
#[derive(Debug, Clone, Default)]
pub struct GroupLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn for_group(&self, external_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(external_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
