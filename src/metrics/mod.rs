//! Prometheus-style counters, per spec.md §4.9: "per-agent counters for
//! received packets, flow samples, flows without raw packet header, flows
//! without data, unknown protocol, Ethernet/Dot1Q/IPv4/IPv6/TCP/UDP decode
//! errors, unknown EtherType."
//!
//! Registration happens once in [`Metrics::new`]; per-agent handles are
//! cheap `IntCounter` clones obtained via `with_label_values` and held by
//! the UDP workers for the lifetime of the process.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// The process-wide metrics registry plus the counter-vec families that get
/// sliced per agent.
pub struct Metrics {
    pub registry: Registry,
    packets_received: IntCounterVec,
    flow_samples: IntCounterVec,
    no_raw_header: IntCounterVec,
    no_data: IntCounterVec,
    sample_decode_errors: IntCounterVec,
    unknown_protocol: IntCounterVec,
    ethernet_errors: IntCounterVec,
    dot1q_errors: IntCounterVec,
    ipv4_errors: IntCounterVec,
    ipv6_errors: IntCounterVec,
    tcp_errors: IntCounterVec,
    udp_errors: IntCounterVec,
    unknown_ethertype: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        macro_rules! vec_counter {
            ($name:literal, $help:literal) => {{
                let v =
                    IntCounterVec::new(Opts::new($name, $help), &["agent"]).expect("valid metric");
                registry.register(Box::new(v.clone())).expect("unique metric name");
                v
            }};
        }

        Self {
            packets_received: vec_counter!("flowhouse_packets_received_total", "UDP datagrams received"),
            flow_samples: vec_counter!("flowhouse_flow_samples_total", "flow samples decoded"),
            no_raw_header: vec_counter!(
                "flowhouse_samples_without_raw_header_total",
                "flow samples without a raw packet header"
            ),
            no_data: vec_counter!("flowhouse_records_without_data_total", "data sets without a resolvable template"),
            sample_decode_errors: vec_counter!(
                "flowhouse_sample_decode_errors_total",
                "flow samples skipped for a truncated or malformed body"
            ),
            unknown_protocol: vec_counter!("flowhouse_unknown_protocol_total", "raw packet headers with protocol != Ethernet"),
            ethernet_errors: vec_counter!("flowhouse_ethernet_decode_errors_total", "Ethernet layer decode errors"),
            dot1q_errors: vec_counter!("flowhouse_dot1q_decode_errors_total", "802.1Q layer decode errors"),
            ipv4_errors: vec_counter!("flowhouse_ipv4_decode_errors_total", "IPv4 layer decode errors"),
            ipv6_errors: vec_counter!("flowhouse_ipv6_decode_errors_total", "IPv6 layer decode errors"),
            tcp_errors: vec_counter!("flowhouse_tcp_decode_errors_total", "TCP layer decode errors"),
            udp_errors: vec_counter!("flowhouse_udp_decode_errors_total", "UDP layer decode errors"),
            unknown_ethertype: vec_counter!("flowhouse_unknown_ethertype_total", "frames with an unrecognized EtherType"),
            registry,
        }
    }

    pub fn sflow_counters(&self, agent: &str) -> SflowCounters {
        SflowCounters {
            packets_received: self.packets_received.with_label_values(&[agent]),
            flow_samples: self.flow_samples.with_label_values(&[agent]),
            no_raw_header: self.no_raw_header.with_label_values(&[agent]),
            sample_decode_errors: self.sample_decode_errors.with_label_values(&[agent]),
            unknown_protocol: self.unknown_protocol.with_label_values(&[agent]),
            ethernet_errors: self.ethernet_errors.with_label_values(&[agent]),
            dot1q_errors: self.dot1q_errors.with_label_values(&[agent]),
            ipv4_errors: self.ipv4_errors.with_label_values(&[agent]),
            ipv6_errors: self.ipv6_errors.with_label_values(&[agent]),
            tcp_errors: self.tcp_errors.with_label_values(&[agent]),
            udp_errors: self.udp_errors.with_label_values(&[agent]),
            unknown_ethertype: self.unknown_ethertype.with_label_values(&[agent]),
        }
    }

    pub fn no_data(&self, agent: &str) -> IntCounter {
        self.no_data.with_label_values(&[agent])
    }

    pub fn packets_received(&self, agent: &str) -> IntCounter {
        self.packets_received.with_label_values(&[agent])
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-agent counter bundle handed to the sFlow decode path.
#[derive(Clone)]
pub struct SflowCounters {
    pub packets_received: IntCounter,
    pub flow_samples: IntCounter,
    pub no_raw_header: IntCounter,
    pub sample_decode_errors: IntCounter,
    pub unknown_protocol: IntCounter,
    pub ethernet_errors: IntCounter,
    pub dot1q_errors: IntCounter,
    pub ipv4_errors: IntCounter,
    pub ipv6_errors: IntCounter,
    pub tcp_errors: IntCounter,
    pub udp_errors: IntCounter,
    pub unknown_ethertype: IntCounter,
}

impl SflowCounters {
    /// Unregistered, free-standing counters for use in unit tests that
    /// don't want to touch the global registry.
    pub fn new_for_test() -> Self {
        Self {
            packets_received: IntCounter::new("t_packets_received", "t").unwrap(),
            flow_samples: IntCounter::new("t_flow_samples", "t").unwrap(),
            no_raw_header: IntCounter::new("t_no_raw_header", "t").unwrap(),
            sample_decode_errors: IntCounter::new("t_sample_decode_errors", "t").unwrap(),
            unknown_protocol: IntCounter::new("t_unknown_protocol", "t").unwrap(),
            ethernet_errors: IntCounter::new("t_ethernet_errors", "t").unwrap(),
            dot1q_errors: IntCounter::new("t_dot1q_errors", "t").unwrap(),
            ipv4_errors: IntCounter::new("t_ipv4_errors", "t").unwrap(),
            ipv6_errors: IntCounter::new("t_ipv6_errors", "t").unwrap(),
            tcp_errors: IntCounter::new("t_tcp_errors", "t").unwrap(),
            udp_errors: IntCounter::new("t_udp_errors", "t").unwrap(),
            unknown_ethertype: IntCounter::new("t_unknown_ethertype", "t").unwrap(),
        }
    }
}
