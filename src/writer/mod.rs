//! Batch writer (C9): drains the aggregator's output channel and persists
//! each flushed batch against the columnar store.
//!
//! Grounded on `original_source/pkg/clickhousegw/clickhousegw.go`'s
//! begin/prepare-once/exec-per-row/commit shape, translated onto
//! ClickHouse's HTTP interface: there's no real multi-statement
//! transaction to begin, so [`StoreTransaction::commit`] is where the
//! single accumulated `INSERT ... VALUES (...), (...), ...` statement is
//! actually sent. The trait boundary mirrors the `SnmpWalker` idiom
//! (`ifresolver/snmp.rs`): boxed futures standing in for `async fn` in a
//! trait, since this crate's dependency stack has no `async-trait`.

pub mod clickhouse;
pub mod memory;

use crate::error::{FlowhouseError, Result};
use crate::model::Flow;
use std::future::Future;
use std::net::{IpAddr, Ipv6Addr};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// One open write against the store. `exec` is called once per flow in a
/// batch; `commit` finalizes (and for the HTTP-backed client, actually
/// performs) the write. Dropping a transaction without committing discards
/// it — there's no implicit commit-on-drop, matching `tx.Rollback()` being
/// the Go default when `Commit` is never reached.
pub trait StoreTransaction: Send {
    fn exec<'a>(&'a mut self, flow: &'a Flow) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// The columnar store handle. One per process; transactions are serialized
/// through the single batch-writer task per spec.md §5, so `begin` doesn't
/// need to support concurrent callers.
pub trait StoreClient: Send + Sync {
    fn ensure_schema<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn begin<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Box<dyn StoreTransaction + 'a>>> + Send + 'a>>;
}

/// Spawns the batch-writer task: drains `output` and, for each batch,
/// begins a transaction, `exec`s every flow, and commits. Per spec.md
/// §4.10/§7, any failure at any step is logged and the whole batch is
/// dropped — there's no retry queue, since the next aggregator flush will
/// carry fresher data anyway.
pub fn spawn(store: Arc<dyn StoreClient>, mut output: mpsc::Receiver<Vec<Flow>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = output.recv().await {
            if batch.is_empty() {
                continue;
            }
            if let Err(e) = write_batch(store.as_ref(), &batch).await {
                error!(error = %e, batch_len = batch.len(), "batch writer: dropping batch after store error");
            } else {
                info!(batch_len = batch.len(), "batch writer: flushed batch");
            }
        }
    })
}

async fn write_batch(store: &dyn StoreClient, batch: &[Flow]) -> Result<()> {
    let mut tx = store.begin().await?;
    for flow in batch {
        tx.exec(flow).await?;
    }
    tx.commit().await
}

/// Maps a v4 address into its v4-mapped-v6 form (`::ffff:a.b.c.d`); a v6
/// address passes through unchanged. Per spec.md's redesign notes, this
/// 16-byte representation only exists at the store boundary — every
/// in-memory `Flow` keeps a plain `IpAddr`.
pub fn ipv6_mapped(addr: IpAddr) -> Ipv6Addr {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}

pub(crate) fn store_error(context: &str, e: impl std::fmt::Display) -> FlowhouseError {
    FlowhouseError::Store(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_address_maps_to_v4_mapped_v6() {
        let v4: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(ipv6_mapped(v4), "::ffff:192.0.2.1".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn v6_address_passes_through() {
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(ipv6_mapped(v6), "2001:db8::1".parse::<Ipv6Addr>().unwrap());
    }
}
