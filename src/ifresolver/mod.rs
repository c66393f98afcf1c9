//! SNMP-driven interface-index resolver (C4): periodically walks each
//! agent's `ifName`/`ifAlias` tables and answers `(agent, ifIndex) -> name`
//! lookups from an in-memory snapshot.
//!
//! Grounded on `original_source/pkg/intfmapper/{intfmapper,device}.go` for
//! the per-device background collector and whole-map-swap shape, and on
//! `original_source/pkg/ifnamecollector/ifname.go` for the "walk ifAlias
//! first, then walk ifName and overwrite matching indices" merge order
//! (spec.md §4.5 supplement).

pub mod snmp;

use crate::model::ifnames::InterfaceMap;
use snmp::SnmpWalker;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

const IF_NAME_OID: &str = "1.3.6.1.2.1.31.1.1.1.1";
const IF_ALIAS_OID: &str = "1.3.6.1.2.1.31.1.1.1.18";
const REFRESH_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub address: IpAddr,
    pub community: String,
}

struct Device {
    map: RwLock<InterfaceMap>,
}

/// Shared across every UDP worker; `resolve` is a read-mostly lookup that
/// never blocks on SNMP I/O.
pub struct InterfaceResolver {
    devices: RwLock<HashMap<IpAddr, Arc<Device>>>,
    walker: Arc<dyn SnmpWalker>,
}

impl InterfaceResolver {
    pub fn new(walker: Arc<dyn SnmpWalker>) -> Arc<Self> {
        Arc::new(Self { devices: RwLock::new(HashMap::new()), walker })
    }

    /// Resolves an interface index for `agent`. Returns the bare index as a
    /// string (matching the Go collector's fallback) when the agent is
    /// unregistered or the index hasn't been seen in a walk yet.
    pub fn resolve(&self, agent: IpAddr, if_index: u32) -> String {
        let devices = self.devices.read().expect("ifresolver lock poisoned");
        match devices.get(&agent) {
            Some(device) => device
                .map
                .read()
                .expect("ifresolver device lock poisoned")
                .resolve(if_index)
                .map(str::to_string)
                .unwrap_or_else(|| if_index.to_string()),
            None => if_index.to_string(),
        }
    }

    /// Registers an agent for periodic SNMP polling and spawns its
    /// collector task. A no-op if the agent is already registered.
    pub fn register_device(self: &Arc<Self>, config: DeviceConfig, shutdown: watch::Receiver<bool>) {
        let mut devices = self.devices.write().expect("ifresolver lock poisoned");
        if devices.contains_key(&config.address) {
            return;
        }
        let device = Arc::new(Device { map: RwLock::new(InterfaceMap::default()) });
        devices.insert(config.address, Arc::clone(&device));
        drop(devices);

        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            resolver.collector_loop(config, device, shutdown).await;
        });
    }

    async fn collector_loop(&self, config: DeviceConfig, device: Arc<Device>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if let Err(e) = self.collect_once(&config, &device).await {
                warn!(agent = %config.address, error = %e, "interface resolver: SNMP walk failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(REFRESH_INTERVAL) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn collect_once(&self, config: &DeviceConfig, device: &Device) -> crate::error::Result<()> {
        let mut by_index: HashMap<u32, String> = HashMap::new();

        for (index, alias) in self.walker.bulk_walk(config.address, &config.community, IF_ALIAS_OID).await? {
            by_index.insert(index, alias);
        }
        for (index, name) in self.walker.bulk_walk(config.address, &config.community, IF_NAME_OID).await? {
            by_index.insert(index, name);
        }

        *device.map.write().expect("ifresolver device lock poisoned") = InterfaceMap::from_entries(by_index);
        Ok(())
    }
}
