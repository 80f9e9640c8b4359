use std::sync::Arc;

use async_trait::async_trait;
use common::IdempotencyKey;
use tokio::sync::Mutex;

use super::{PendingIncrement, PendingIncrementStore};
use crate::Result;

/// Pending increments held in process memory. Lost on restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPendingIncrements {
    items: Arc<Mutex<Vec<PendingIncrement>>>,
}

impl InMemoryPendingIncrements {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingIncrementStore for InMemoryPendingIncrements {
    async fn push(&self, pending: PendingIncrement) -> Result<()> {
        let mut items = self.items.lock().await;
        if !items.iter().any(|p| p.key == pending.key) {
            items.push(pending);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingIncrement>> {
        Ok(self.items.lock().await.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.items.lock().await.len())
    }

    async fn remove(&self, key: &IdempotencyKey) -> Result<()> {
        self.items.lock().await.retain(|p| &p.key != key);
        Ok(())
    }

    async fn record_failure(&self, key: &IdempotencyKey) -> Result<()> {
        if let Some(item) = self.items.lock().await.iter_mut().find(|p| &p.key == key) {
            item.attempts += 1;
        }
        Ok(())
    }
}
