//! In-memory [`StoreClient`] double: appends every committed flow to a
//! shared `Vec` instead of talking to ClickHouse. Used by the batch-writer
//! and supervisor tests.

use super::{StoreClient, StoreTransaction};
use crate::error::Result;
use crate::model::Flow;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MemoryStore {
    pub committed: Arc<Mutex<Vec<Flow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Flow> {
        self.committed.lock().expect("memory store lock poisoned").clone()
    }
}

struct MemoryTransaction {
    committed: Arc<Mutex<Vec<Flow>>>,
    pending: Vec<Flow>,
}

impl StoreTransaction for MemoryTransaction {
    fn exec<'a>(&'a mut self, flow: &'a Flow) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        self.pending.push(flow.clone());
        Box::pin(async { Ok(()) })
    }

    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            self.committed.lock().expect("memory store lock poisoned").extend(self.pending);
            Ok(())
        })
    }
}

impl StoreClient for MemoryStore {
    fn ensure_schema<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    fn begin<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Box<dyn StoreTransaction + 'a>>> + Send + 'a>> {
        let committed = Arc::clone(&self.committed);
        Box::pin(async move {
            let tx: Box<dyn StoreTransaction + 'a> = Box::new(MemoryTransaction { committed, pending: Vec::new() });
            Ok(tx)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[tokio::test]
    async fn committed_flows_are_visible_after_commit() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let agent: IpAddr = "192.0.2.1".parse().unwrap();
        let flow = Flow::new(agent, 4);
        tx.exec(&flow).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_never_commits() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            let flow = Flow::new("192.0.2.1".parse().unwrap(), 4);
            tx.exec(&flow).await.unwrap();
            // tx dropped here without commit
        }
        assert!(store.snapshot().is_empty());
    }
}
