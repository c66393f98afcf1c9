//! Route mirror (C5): per-(router, VRF, address family) RIB fed by
//! streaming upstream updates, queried by the annotator via LPM.
//!
//! Grounded on `original_source/pkg/routemirror/{route_mirror,router,vrf}.go`
//! for the router/VRF registration shape and the "LPM returns the last
//! covering-prefix match" policy (see [`rib::Rib::lpm`]), and on
//! `DevQps-bgp-rs`'s `PathAttribute` AS-path segment shape for [`AsPath`].

pub mod rib;
pub mod ris;

use crate::error::{FlowhouseError, Result};
use rib::{Rib, Route};
use ris::{RouteStream, RouteUpdate};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};

/// One segment of a BGP AS-path: `AS_SEQUENCE`/`AS_SET` aren't
/// distinguished since annotation only ever reads the first/last ASN.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsPathSegment {
    pub asns: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsPath {
    pub segments: Vec<AsPathSegment>,
}

impl AsPath {
    pub fn first_segment_first_asn(&self) -> Option<u32> {
        self.segments.first()?.asns.first().copied()
    }

    pub fn last_segment_last_asn(&self) -> Option<u32> {
        self.segments.last()?.asns.last().copied()
    }
}

struct Vrf {
    rib_v4: Rib,
    rib_v6: Rib,
}

impl Vrf {
    fn new() -> Self {
        Self { rib_v4: Rib::new(32), rib_v6: Rib::new(128) }
    }

    fn rib(&self, family: u8) -> &Rib {
        if family == 6 {
            &self.rib_v6
        } else {
            &self.rib_v4
        }
    }
}

struct Router {
    vrfs: RwLock<HashMap<u64, Arc<Vrf>>>,
}

pub struct RouterConfig {
    pub name: String,
    pub address: IpAddr,
    pub vrfs: Vec<u64>,
}

pub struct RouteMirror {
    routers: RwLock<HashMap<IpAddr, Arc<Router>>>,
    upstreams: Vec<Arc<dyn RouteStream>>,
}

impl RouteMirror {
    pub fn new(upstreams: Vec<Arc<dyn RouteStream>>) -> Arc<Self> {
        Arc::new(Self { routers: RwLock::new(HashMap::new()), upstreams })
    }

    /// Registers a router and its VRFs, spawning one merge-writer task plus
    /// one upstream-feeder task per (vrf, address family, upstream).
    pub fn register_router(self: &Arc<Self>, config: RouterConfig, shutdown: watch::Receiver<bool>) {
        let mut routers = self.routers.write().expect("route mirror lock poisoned");
        let router = routers.entry(config.address).or_insert_with(|| Arc::new(Router { vrfs: RwLock::new(HashMap::new()) }));
        let router = Arc::clone(router);
        drop(routers);

        for vrf_rd in config.vrfs {
            let vrf = {
                let mut vrfs = router.vrfs.write().expect("route mirror lock poisoned");
                Arc::clone(vrfs.entry(vrf_rd).or_insert_with(|| Arc::new(Vrf::new())))
            };

            for family in [4u8, 6u8] {
                let (tx, rx) = mpsc::channel(1024);
                for upstream in &self.upstreams {
                    upstream.spawn(config.address, vrf_rd, family, tx.clone(), shutdown.clone());
                }
                drop(tx);
                spawn_merge_writer(Arc::clone(&vrf), family, rx);
            }
        }
    }

    /// Longest-prefix match against a router's VRF. `router_addr` is the
    /// same address the UDP servers stamp onto `Flow::agent`.
    pub fn lpm(&self, router_addr: IpAddr, vrf_rd: u64, addr: IpAddr) -> Result<Option<Arc<Route>>> {
        let routers = self.routers.read().expect("route mirror lock poisoned");
        let router = routers.get(&router_addr).ok_or_else(|| FlowhouseError::RouterUnknown(router_addr.to_string()))?;

        let vrfs = router.vrfs.read().expect("route mirror lock poisoned");
        let vrf = vrfs.get(&vrf_rd).ok_or(FlowhouseError::VrfUnknown(vrf_rd))?;

        let family = if addr.is_ipv4() { 4 } else { 6 };
        Ok(vrf.rib(family).lpm(addr))
    }
}

fn spawn_merge_writer(vrf: Arc<Vrf>, family: u8, mut rx: mpsc::Receiver<RouteUpdate>) {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            let rib = vrf.rib(family);
            match update {
                RouteUpdate::Add { prefix, next_hop, as_path } => {
                    rib.insert(prefix, Route { prefix, next_hop, as_path });
                }
                RouteUpdate::Withdraw { prefix } => rib.withdraw(prefix),
            }
        }
    });
}
