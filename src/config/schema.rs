//! Collector configuration schema, per spec.md §6. Kept from the teacher's
//! YAML-via-`serde_yaml` approach, generalized from flow-generation
//! parameters to Flowhouse's collector schema.
//!
//! Grounded on `original_source/cmd/flowhouse/config/config.go` for field
//! names, defaults, and nesting.

use serde::Deserialize;

fn default_listen_sflow() -> String {
    ":6343".to_string()
}

fn default_listen_ipfix() -> String {
    ":4739".to_string()
}

fn default_listen_http() -> String {
    ":9991".to_string()
}

fn default_ris_timeout() -> u64 {
    10
}

/// Root configuration structure.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_listen_sflow")]
    pub listen_sflow: String,

    #[serde(default = "default_listen_ipfix")]
    pub listen_ipfix: String,

    #[serde(default = "default_listen_http")]
    pub listen_http: String,

    /// Keepalive timeout, in seconds, for gRPC-equivalent RIS connections.
    #[serde(default = "default_ris_timeout")]
    pub ris_timeout: u64,

    /// Human-readable route distinguisher (e.g. `"65000:1"`) stamped onto
    /// every flow's `vrf_in`/`vrf_out` when the IP annotator is enabled.
    #[serde(default)]
    pub default_vrf: String,

    #[serde(default)]
    pub disable_ip_annotator: bool,

    pub snmp: Option<SnmpConfig>,

    #[serde(default)]
    pub routers: Vec<RouterConfig>,

    pub clickhouse: Option<ClickhouseConfig>,

    /// Enrichment dictionaries. Accepted and shape-validated but otherwise
    /// unused — applying them is a frontend-only concern, out of scope here.
    #[serde(default)]
    pub dicts: Vec<DictConfig>,
}

/// SNMP credentials for the interface resolver. Only v2c (`community`) is
/// actually exercised by [`crate::ifresolver::snmp::CsnmpWalker`] today; the
/// v3 fields are accepted and validated so a config written for a v3-capable
/// deployment still loads, but `version` must currently be `2`.
#[derive(Debug, Deserialize, Clone)]
pub struct SnmpConfig {
    pub version: u8,

    #[serde(default)]
    pub community: String,

    #[serde(default)]
    pub user: String,

    #[serde(rename = "auth-key", default)]
    pub auth_key: String,

    #[serde(rename = "privacy-passphrase", default)]
    pub privacy_passphrase: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    pub name: String,
    pub address: String,

    #[serde(default)]
    pub ris_instances: Vec<String>,

    #[serde(default)]
    pub vrfs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClickhouseConfig {
    pub address: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    pub database: String,

    #[serde(default)]
    pub sharded: bool,

    #[serde(default)]
    pub cluster: Option<String>,

    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DictConfig {
    pub field: String,
    pub dict: String,

    #[serde(default)]
    pub expr: Option<String>,
}
