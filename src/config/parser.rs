use crate::config::schema::Config;
use crate::error::{FlowhouseError, Result};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

/// Parse a YAML configuration file.
pub fn parse_yaml_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    parse_yaml_str(&contents)
}

/// Parse a YAML configuration string.
pub fn parse_yaml_str(contents: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

/// Parses a listen address, accepting the Go-style shorthand (`":6343"`
/// binds all interfaces) in addition to a fully-qualified `host:port`.
pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr> {
    let candidate = if let Some(port) = raw.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        raw.to_string()
    };
    candidate
        .parse()
        .map_err(|e| FlowhouseError::Config(format!("invalid listen address {raw:?}: {e}")))
}

/// Parses a human-readable route distinguisher (`"65000:1"` or
/// `"192.0.2.1:1"`) into an internal VRF id.
///
/// Grounded on `bio-rd`'s `vrf.ParseHumanReadableRouteDistinguisher`
/// (`original_source/cmd/flowhouse/config/config.go`): the left-hand side is
/// either a 16-bit ASN (type 0, paired with a 32-bit number) or a 32-bit AS
/// number (type 2, paired with a 16-bit number), and an IPv4 address on the
/// left selects type 1 (paired with a 16-bit number). This packs a type tag
/// into the high bits rather than reproducing RFC 4364's exact byte layout —
/// nothing outside this crate inspects the bits, it only needs distinct RDs
/// to parse to distinct `u64`s.
pub fn parse_route_distinguisher(raw: &str) -> Result<u64> {
    let (left, right) = raw
        .split_once(':')
        .ok_or_else(|| FlowhouseError::Config(format!("invalid route distinguisher {raw:?}: missing ':'")))?;

    let bad = |e: std::num::ParseIntError| FlowhouseError::Config(format!("invalid route distinguisher {raw:?}: {e}"));

    if let Ok(addr) = left.parse::<std::net::Ipv4Addr>() {
        let number: u16 = right.parse().map_err(bad)?;
        return Ok((1u64 << 48) | (u32::from(addr) as u64) << 16 | number as u64);
    }

    let asn: u64 = left.parse().map_err(bad)?;
    if asn <= u16::MAX as u64 {
        let number: u32 = right.parse().map_err(bad)?;
        Ok((asn << 32) | number as u64)
    } else {
        let number: u16 = right.parse().map_err(bad)?;
        Ok((2u64 << 48) | (asn << 16) | number as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_collector_config() {
        let yaml = r#"
listen_sflow: ":6343"
listen_ipfix: ":4739"
listen_http: ":9991"
ris_timeout: 10
default_vrf: "65000:1"
disable_ip_annotator: false
snmp:
  version: 2
  community: public
routers:
  - name: r1
    address: "192.0.2.1"
    ris_instances: ["127.0.0.1:9001"]
    vrfs: ["65000:1"]
clickhouse:
  address: "localhost:8123"
  user: default
  password: ""
  database: flowhouse
  sharded: false
  secure: false
dicts:
  - field: src_as
    dict: asn_names
    expr: "toString(src_as)"
"#;
        let config = parse_yaml_str(yaml).unwrap();
        assert_eq!(config.routers.len(), 1);
        assert_eq!(config.routers[0].vrfs, vec!["65000:1"]);
        assert_eq!(config.clickhouse.unwrap().database, "flowhouse");
    }

    #[test]
    fn defaults_apply_when_keys_are_omitted() {
        let config = parse_yaml_str("routers: []\n").unwrap();
        assert_eq!(config.listen_sflow, ":6343");
        assert_eq!(config.listen_ipfix, ":4739");
        assert_eq!(config.listen_http, ":9991");
        assert_eq!(config.ris_timeout, 10);
        assert!(!config.disable_ip_annotator);
    }

    #[test]
    fn shorthand_listen_address_binds_all_interfaces() {
        let addr = parse_listen_addr(":6343").unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:6343");
    }

    #[test]
    fn fully_qualified_listen_address_passes_through() {
        let addr = parse_listen_addr("127.0.0.1:6343").unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:6343");
    }

    #[test]
    fn two_byte_asn_route_distinguisher_round_trips_distinctly() {
        let a = parse_route_distinguisher("65000:1").unwrap();
        let b = parse_route_distinguisher("65000:2").unwrap();
        let c = parse_route_distinguisher("65001:1").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ipv4_address_route_distinguisher_differs_from_asn_form() {
        let ip_rd = parse_route_distinguisher("192.0.2.1:1").unwrap();
        let asn_rd = parse_route_distinguisher("1:1").unwrap();
        assert_ne!(ip_rd, asn_rd);
    }

    #[test]
    fn four_byte_asn_route_distinguisher_parses() {
        let rd = parse_route_distinguisher("4200000000:7").unwrap();
        assert_ne!(rd, 0);
    }

    #[test]
    fn malformed_route_distinguisher_is_rejected() {
        assert!(parse_route_distinguisher("not-a-rd").is_err());
    }
}
