use crate::config::parser::{parse_listen_addr, parse_route_distinguisher};
use crate::config::schema::Config;
use crate::error::{FlowhouseError, Result};

/// Validates a parsed configuration: every address and route distinguisher
/// must parse, and a sharded ClickHouse deployment must name a cluster.
pub fn validate_config(config: &Config) -> Result<()> {
    parse_listen_addr(&config.listen_sflow)?;
    parse_listen_addr(&config.listen_ipfix)?;
    parse_listen_addr(&config.listen_http)?;

    if !config.default_vrf.is_empty() {
        parse_route_distinguisher(&config.default_vrf)?;
    }

    if let Some(snmp) = &config.snmp {
        if snmp.version != 2 {
            return Err(FlowhouseError::Config(format!(
                "unsupported snmp.version {}: only v2c (2) is implemented",
                snmp.version
            )));
        }
    }

    for router in &config.routers {
        router.address.parse::<std::net::IpAddr>().map_err(|e| {
            FlowhouseError::Config(format!("router {:?}: invalid address {:?}: {e}", router.name, router.address))
        })?;

        for vrf in &router.vrfs {
            parse_route_distinguisher(vrf)?;
        }

        for ris in &router.ris_instances {
            ris.parse::<std::net::SocketAddr>().map_err(|e| {
                FlowhouseError::Config(format!("router {:?}: invalid ris_instances entry {:?}: {e}", router.name, ris))
            })?;
        }
    }

    if let Some(ch) = &config.clickhouse {
        if ch.address.is_empty() {
            return Err(FlowhouseError::Config("clickhouse.address must not be empty".into()));
        }
        if ch.database.is_empty() {
            return Err(FlowhouseError::Config("clickhouse.database must not be empty".into()));
        }
        if ch.sharded && ch.cluster.is_none() {
            return Err(FlowhouseError::Config("clickhouse.cluster is required when clickhouse.sharded is true".into()));
        }
    }

    Ok(())
}
