//! IPFIX v10 UDP listener (C8b).
//!
//! Grounded on `original_source/pkg/servers/ipfix/ipfix_server.go`'s
//! `IPFIXServer`: same bind/worker-pool/stop shape as the sFlow server, but
//! owns a template cache and sample-rate cache instead of per-layer decode
//! counters (IPFIX carries no raw Ethernet frame to decode further).

use crate::annotator::Annotator;
use crate::decode::ipfix::{self, sample_rate::SampleRateCache, template_cache::TemplateCache};
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

pub struct IpfixServer {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl IpfixServer {
    #[allow(clippy::too_many_arguments)]
    pub async fn bind(
        listen: SocketAddr,
        num_workers: usize,
        metrics: Arc<Metrics>,
        resolver: Arc<InterfaceResolver>,
        annotator: Option<Arc<Annotator>>,
        templates: Arc<TemplateCache>,
        sample_rates: Arc<SampleRateCache>,
        ingress: mpsc::Sender<Flow>,
        vrf_in: u64,
        vrf_out: u64,
    ) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(listen).await?);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = worker::spawn_workers(socket, num_workers, Arc::clone(&metrics), shutdown_rx, move |agent, buf| {
            let no_data = metrics.no_data(&agent.to_string());
            match ipfix::decode(buf, agent, &templates, &sample_rates, &resolver, &no_data) {
                Ok(flows) => {
                    for mut flow in flows {
                        if let Some(annotator) = &annotator {
                            flow.vrf_in = vrf_in;
                            flow.vrf_out = vrf_out;
                            annotator.annotate(&mut flow);
                        }
                        if ingress.try_send(flow).is_err() {
                            warn!(%agent, "IPFIX: aggregator ingress full or closed, dropping flow");
                        }
                    }
                }
                Err(e) => debug!(%agent, error = %e, "IPFIX: datagram decode failed"),
            }
        });

        Ok(Self { handles, shutdown_tx })
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
