//! Pipeline supervisor (C10): owns configuration, every long-lived
//! component, and process shutdown.
//!
//! Grounded on `original_source/pkg/flowhouse/flowhouse.go`'s `Flowhouse`:
//! `New` builds every component up front, `AddAgent` registers SNMP
//! polling plus route-mirror targets per configured router, and `Run`
//! starts the HTTP listener and then drives the main ingest loop. Here the
//! "main loop" is the shared [`crate::aggregator::Aggregator`] task plus
//! the [`crate::writer`] task rather than a blocking `for` loop, since the
//! UDP servers push pre-annotated flows onto a channel instead of calling
//! back into `Run` directly (spec.md §4.7's shared-aggregator design).

use crate::aggregator::{system_clock, Aggregator};
use crate::annotator::Annotator;
use crate::config::parser::{parse_listen_addr, parse_route_distinguisher};
use crate::config::schema::{Config, RouterConfig as RouterConfigEntry};
use crate::decode::ipfix::{sample_rate::SampleRateCache, template_cache::TemplateCache};
use crate::error::{FlowhouseError, Result};
use crate::http::HttpServer;
use crate::ifresolver::snmp::CsnmpWalker;
use crate::ifresolver::{DeviceConfig, InterfaceResolver};
use crate::metrics::Metrics;
use crate::model::Flow;
use crate::routemirror::ris::{NewlineJsonRis, RouteStream};
use crate::routemirror::{RouteMirror, RouterConfig as MirrorRouterConfig};
use crate::servers::ipfix::IpfixServer;
use crate::servers::sflow::SflowServer;
use crate::writer::clickhouse::{ClickHouseClient, ClickHouseConfig};
use crate::writer::memory::MemoryStore;
use crate::writer::StoreClient;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Owns every long-lived component. Built by [`Supervisor::new`], then
/// consumed by [`Supervisor::run`].
pub struct Supervisor {
    config: Config,
    metrics: Arc<Metrics>,
    resolver: Arc<InterfaceResolver>,
    mirror: Arc<RouteMirror>,
    annotator: Option<Arc<Annotator>>,
    store: Arc<dyn StoreClient>,
    default_vrf: u64,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    /// Builds every component from `config`. Doesn't bind any socket yet —
    /// that happens in [`Supervisor::run`], so construction can't fail on
    /// a port already being in use.
    pub fn new(config: Config) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let resolver = InterfaceResolver::new(Arc::new(CsnmpWalker));

        // `RouteMirror` is constructed with one shared upstream set rather
        // than a per-router selection (a deliberate simplification over the
        // Go original, documented in DESIGN.md); the set is the deduplicated
        // union of every router's `ris_instances`, mirroring `config.go`'s
        // own `GetRISList()` helper.
        let mut ris_addrs: Vec<String> = config.routers.iter().flat_map(|r| r.ris_instances.clone()).collect();
        ris_addrs.sort();
        ris_addrs.dedup();
        let upstreams: Vec<Arc<dyn RouteStream>> = ris_addrs
            .into_iter()
            .map(|addr| Arc::new(NewlineJsonRis { upstream: addr }) as Arc<dyn RouteStream>)
            .collect();
        let mirror = RouteMirror::new(upstreams);

        let annotator = if config.disable_ip_annotator {
            None
        } else {
            Some(Arc::new(Annotator::new(Arc::clone(&mirror))))
        };

        let default_vrf = if config.default_vrf.is_empty() {
            0
        } else {
            parse_route_distinguisher(&config.default_vrf)?
        };

        let store: Arc<dyn StoreClient> = match &config.clickhouse {
            Some(ch) => Arc::new(ClickHouseClient::new(ClickHouseConfig {
                address: ch.address.clone(),
                user: ch.user.clone(),
                password: ch.password.clone(),
                database: ch.database.clone(),
                sharded: ch.sharded,
                cluster: ch.cluster.clone(),
                secure: ch.secure,
            })),
            None => Arc::new(MemoryStore::new()),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            metrics,
            resolver,
            mirror,
            annotator,
            store,
            default_vrf,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// A clone of the shutdown sender; the caller (`main`) wires this to
    /// `ctrlc` or any other external trigger.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Registers a configured router: SNMP interface polling (if `snmp` is
    /// configured process-wide) and one route-mirror target per VRF.
    /// Mirrors `flowhouse.go`'s `AddAgent`.
    fn add_router(&self, router: &RouterConfigEntry) -> Result<()> {
        let address: IpAddr = router
            .address
            .parse()
            .map_err(|e| FlowhouseError::Config(format!("router {:?}: invalid address {:?}: {e}", router.name, router.address)))?;

        if let Some(snmp) = &self.config.snmp {
            self.resolver.register_device(
                DeviceConfig { address, community: snmp.community.clone() },
                self.shutdown_rx.clone(),
            );
        }

        let mut vrfs = Vec::with_capacity(router.vrfs.len());
        for rd in &router.vrfs {
            vrfs.push(parse_route_distinguisher(rd)?);
        }

        self.mirror.register_router(
            MirrorRouterConfig { name: router.name.clone(), address, vrfs },
            self.shutdown_rx.clone(),
        );

        Ok(())
    }

    /// Binds every server, wires the aggregator/writer channels, registers
    /// every configured router, and blocks until the shutdown signal fires.
    /// Returns once every background task has stopped.
    pub async fn run(self) -> Result<()> {
        for router in &self.config.routers {
            self.add_router(router)?;
        }

        self.store.ensure_schema().await?;

        let num_workers = num_cpus::get();
        let (ingress_tx, ingress_rx) = mpsc::channel::<Flow>(1024);
        let (output_tx, output_rx) = mpsc::channel::<Vec<Flow>>(64);

        let templates = Arc::new(TemplateCache::new());
        let sample_rates = Arc::new(SampleRateCache::new());

        let sflow_listen = parse_listen_addr(&self.config.listen_sflow)?;
        let ipfix_listen = parse_listen_addr(&self.config.listen_ipfix)?;
        let http_listen = parse_listen_addr(&self.config.listen_http)?;

        let sflow_server = SflowServer::bind(
            sflow_listen,
            num_workers,
            Arc::clone(&self.metrics),
            Arc::clone(&self.resolver),
            self.annotator.clone(),
            ingress_tx.clone(),
            self.default_vrf,
            self.default_vrf,
        )
        .await?;
        info!(address = %sflow_listen, "sFlow server listening");

        let ipfix_server = IpfixServer::bind(
            ipfix_listen,
            num_workers,
            Arc::clone(&self.metrics),
            Arc::clone(&self.resolver),
            self.annotator.clone(),
            templates,
            sample_rates,
            ingress_tx,
            self.default_vrf,
            self.default_vrf,
        )
        .await?;
        info!(address = %ipfix_listen, "IPFIX server listening");

        let http_server = HttpServer::bind(http_listen, Arc::clone(&self.metrics))?;
        info!(address = %http_server.local_addr, "HTTP server listening");

        let aggregator_handle = Aggregator::new(system_clock()).spawn(ingress_rx, output_tx, self.shutdown_rx.clone());
        let writer_handle = crate::writer::spawn(Arc::clone(&self.store), output_rx);

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            shutdown_rx.changed().await.ok();
            if *shutdown_rx.borrow() {
                break;
            }
        }

        info!("shutdown signal received, stopping servers");
        sflow_server.stop().await;
        ipfix_server.stop().await;
        http_server.stop();

        let _ = aggregator_handle.await;
        let _ = writer_handle.await;

        Ok(())
    }
}
