//! sFlow v5 UDP listener (C8a).
//!
//! Grounded on `original_source/pkg/servers/sflow/sfserver.go`'s
//! `SflowServer`: `New`/`startService` bind one socket and spawn a worker
//! pool; `Stop` closes the stop channel, closes the socket, and joins the
//! workers. This version pushes each decoded+annotated flow onto a channel
//! feeding the shared [`crate::aggregator::Aggregator`] rather than owning
//! a private per-server aggregator, per spec.md §4.7's single shared
//! aggregator design.

use crate::annotator::Annotator;
use crate::decode::sflow;
use crate::error::Result;
use crate::ifresolver::InterfaceResolver;
use crate::metrics::Metrics;
use crate::model::Flow;
use crate::servers::worker;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct SflowServer {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SflowServer {
    #[allow(clippy::too_many_arguments)]
    pub async fn bind(
        listen: SocketAddr,
        num_workers: usize,
        metrics: Arc<Metrics>,
        resolver: Arc<InterfaceResolver>,
        annotator: Option<Arc<Annotator>>,
        ingress: mpsc::Sender<Flow>,
        vrf_in: u64,
        vrf_out: u64,
    ) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(listen).await?);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = worker::spawn_workers(socket, num_workers, Arc::clone(&metrics), shutdown_rx, move |agent, buf| {
            let counters = metrics.sflow_counters(&agent.to_string());
            match sflow::decode(buf, agent, &resolver, &counters) {
                Ok(flows) => {
                    for mut flow in flows {
                        if let Some(annotator) = &annotator {
                            flow.vrf_in = vrf_in;
                            flow.vrf_out = vrf_out;
                            annotator.annotate(&mut flow);
                        }
                        if ingress.try_send(flow).is_err() {
                            warn!(%agent, "sFlow: aggregator ingress full or closed, dropping flow");
                        }
                    }
                }
                Err(e) => debug!(%agent, error = %e, "sFlow: datagram decode failed"),
            }
        });

        Ok(Self { handles, shutdown_tx })
    }

    /// Signals every worker to stop and waits for them to exit. Workers
    /// exit at the top of their next read-or-shutdown select, matching the
    /// Go `Stop()`'s close-then-join sequencing; in-flight datagrams are
    /// not drained first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
