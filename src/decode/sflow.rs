//! sFlow v5 (RFC 3176) datagram decoder.
//!
//! The original decoder cast the incoming datagram, byte-reversed, through
//! `unsafe.Pointer` onto Go structs whose field order is therefore the
//! *reverse* of the wire layout. This version walks the datagram forward
//! with a bounds-checked [`Cursor`], which is both easier to audit and safe
//! against a truncated or malicious datagram.
//!
//! Only `flow_sample` (format 1) and `expanded_flow_sample` (format 3)
//! samples are recognized; counter samples and anything else are skipped by
//! length. Within a flow sample, only the Raw Packet Header (format 1),
//! Extended Switch (format 1001) and Extended Router (format 1002) records
//! are interpreted — everything else is skipped by its declared length.

use crate::decode::cursor::Cursor;
use crate::decode::packet::decode_ethernet;
use crate::error::{FlowhouseError, Result};
use crate::ifresolver::InterfaceResolver;
use crate::metrics::SflowCounters;
use crate::model::Flow;
use std::net::IpAddr;
use tracing::debug;

const VERSION: u32 = 5;

const SAMPLE_FLOW: u32 = 1;
const SAMPLE_EXPANDED_FLOW: u32 = 3;

const RECORD_RAW_PACKET_HEADER: u32 = 1;
const RECORD_EXTENDED_SWITCH: u32 = 1001;
const RECORD_EXTENDED_ROUTER: u32 = 1002;

const HEADER_PROTOCOL_ETHERNET: u32 = 1;

/// Decodes one sFlow v5 UDP datagram into zero or more [`Flow`] records.
/// `agent` is the UDP packet's *source* address, not the agent-address field
/// carried inside the sFlow header — they usually agree, but the source
/// address is what the original collector keys everything on.
pub fn decode(buf: &[u8], agent: IpAddr, resolver: &InterfaceResolver, counters: &SflowCounters) -> Result<Vec<Flow>> {
    let mut cur = Cursor::new(buf);

    let version = cur.read_u32()?;
    if version != VERSION {
        return Err(FlowhouseError::UnsupportedVersion(version as u16));
    }

    let agent_address_type = cur.read_u32()?;
    match agent_address_type {
        1 => {
            cur.read_ipv4()?;
        }
        2 => {
            cur.read_ipv6()?;
        }
        other => return Err(FlowhouseError::Snmp(format!("unknown agent address type {other}"))),
    }
    cur.read_u32()?; // sub_agent_id
    cur.read_u32()?; // sequence_number
    cur.read_u32()?; // sys_up_time
    let num_samples = cur.read_u32()?;

    let mut flows = Vec::new();
    for _ in 0..num_samples {
        let data_format = cur.read_u32()?;
        let length = cur.read_u32()? as usize;
        let body = cur.read_bytes(length)?;

        match data_format {
            SAMPLE_FLOW => {
                if let Err(e) = decode_flow_sample(body, agent, false, resolver, counters, &mut flows) {
                    counters.sample_decode_errors.inc();
                    debug!(%agent, error = %e, "sflow: skipping truncated flow sample");
                }
            }
            SAMPLE_EXPANDED_FLOW => {
                if let Err(e) = decode_flow_sample(body, agent, true, resolver, counters, &mut flows) {
                    counters.sample_decode_errors.inc();
                    debug!(%agent, error = %e, "sflow: skipping truncated expanded flow sample");
                }
            }
            _ => {} // counter sample or unrecognized; already skipped via `length`
        }
    }

    Ok(flows)
}

fn decode_flow_sample(
    body: &[u8],
    agent: IpAddr,
    expanded: bool,
    resolver: &InterfaceResolver,
    counters: &SflowCounters,
    out: &mut Vec<Flow>,
) -> Result<()> {
    counters.flow_samples.inc();
    let mut cur = Cursor::new(body);

    cur.read_u32()?; // sequence_number
    cur.read_u32()?; // source_id (or source_id_type + source_id_index when expanded)
    let sampling_rate = cur.read_u32()?;
    cur.read_u32()?; // sample_pool
    cur.read_u32()?; // drops

    let (input_if, output_if) = if expanded {
        cur.read_u32()?; // input interface format
        let input_if = cur.read_u32()?;
        cur.read_u32()?; // output interface format
        let output_if = cur.read_u32()?;
        (input_if, output_if)
    } else {
        (cur.read_u32()?, cur.read_u32()?)
    };

    let num_records = cur.read_u32()?;

    let mut raw_header: Option<(u32, u32, Vec<u8>)> = None; // (frame_length, protocol, header_bytes)
    let mut next_hop: Option<IpAddr> = None;
    let mut incoming_vlan = 0u32;
    let mut outgoing_vlan = 0u32;
    let mut saw_switch_record = false;

    for _ in 0..num_records {
        let record_format = cur.read_u32()?;
        let record_length = cur.read_u32()? as usize;
        let record_body = cur.read_bytes(record_length)?;

        match record_format {
            RECORD_RAW_PACKET_HEADER => {
                let mut rc = Cursor::new(record_body);
                let protocol = rc.read_u32()?;
                let frame_length = rc.read_u32()?;
                rc.read_u32()?; // stripped
                let header_length = rc.read_u32()? as usize;
                let header = rc.read_bytes(header_length)?.to_vec();
                raw_header = Some((frame_length, protocol, header));
            }
            RECORD_EXTENDED_SWITCH => {
                let mut rc = Cursor::new(record_body);
                incoming_vlan = rc.read_u32()?;
                rc.read_u32()?; // incoming priority
                outgoing_vlan = rc.read_u32()?;
                rc.read_u32()?; // outgoing priority
                saw_switch_record = true;
            }
            RECORD_EXTENDED_ROUTER => {
                let mut rc = Cursor::new(record_body);
                let addr_type = rc.read_u32()?;
                let addr = match addr_type {
                    1 => Some(IpAddr::V4(rc.read_ipv4()?)),
                    2 => Some(IpAddr::V6(rc.read_ipv6()?)),
                    _ => None,
                };
                rc.read_u32()?; // src_mask_len
                rc.read_u32()?; // dst_mask_len
                next_hop = addr;
            }
            _ => {} // skipped by length
        }
    }

    let Some((frame_length, protocol, header)) = raw_header else {
        counters.no_raw_header.inc();
        return Ok(());
    };

    if protocol != HEADER_PROTOCOL_ETHERNET {
        counters.unknown_protocol.inc();
        return Ok(());
    }

    let mut int_in = resolver.resolve(agent, input_if);
    let mut int_out = resolver.resolve(agent, output_if);
    if saw_switch_record {
        int_in.push_str(&format!(".{incoming_vlan}"));
        int_out.push_str(&format!(".{outgoing_vlan}"));
    }

    let Some(inner) = decode_ethernet(&header, counters) else {
        return Ok(());
    };

    let family = inner.family.unwrap_or(4);
    let mut flow = Flow::new(agent, family);
    flow.int_in = int_in;
    flow.int_out = int_out;
    flow.size = frame_length as u64;
    flow.packets = 1;
    flow.samplerate = sampling_rate as u64;
    if let Some(nh) = next_hop {
        flow.next_hop = nh;
    }
    if let Some(addr) = inner.src_addr {
        flow.src_addr = addr;
    }
    if let Some(addr) = inner.dst_addr {
        flow.dst_addr = addr;
    }
    flow.protocol = inner.protocol.unwrap_or(0);
    flow.tos = inner.tos.unwrap_or(0);
    flow.src_port = inner.src_port.unwrap_or(0);
    flow.dst_port = inner.dst_port.unwrap_or(0);

    out.push(flow);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifresolver::snmp::test_support::FakeSnmpWalker;
    use std::sync::Arc;

    fn no_op_resolver() -> Arc<InterfaceResolver> {
        InterfaceResolver::new(Arc::new(FakeSnmpWalker::default()))
    }

    struct Writer(Vec<u8>);
    impl Writer {
        fn new() -> Self {
            Self(Vec::new())
        }
        fn u32(&mut self, v: u32) -> &mut Self {
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn bytes(&mut self, b: &[u8]) -> &mut Self {
            self.0.extend_from_slice(b);
            self
        }
    }

    fn eth_ipv4_udp() -> Vec<u8> {
        let mut buf = vec![0u8; 14];
        buf[12] = 0x08;
        buf[13] = 0x00;
        buf.extend_from_slice(&[0x45, 0x00]);
        buf.extend_from_slice(&[0, 28]);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&[0, 0]);
        buf.push(64);
        buf.push(17); // UDP
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&[198, 51, 100, 24]);
        buf.extend_from_slice(&[203, 0, 113, 30]);
        buf.extend_from_slice(&6343u16.to_be_bytes());
        buf.extend_from_slice(&9999u16.to_be_bytes());
        buf
    }

    fn build_sample_body(expanded: bool) -> Vec<u8> {
        let header = eth_ipv4_udp();

        let mut raw_record = Writer::new();
        raw_record.u32(1); // protocol = Ethernet
        raw_record.u32(64); // frame_length
        raw_record.u32(0); // stripped
        raw_record.u32(header.len() as u32);
        raw_record.bytes(&header);

        let mut sample = Writer::new();
        sample.u32(1); // sequence_number
        if expanded {
            sample.u32(0); // source_id_type
            sample.u32(0); // source_id_index
        } else {
            sample.u32(0); // source_id
        }
        sample.u32(512); // sampling_rate
        sample.u32(0); // sample_pool
        sample.u32(0); // drops
        if expanded {
            sample.u32(0).u32(7).u32(0).u32(9); // in format/value, out format/value
        } else {
            sample.u32(7).u32(9); // input_if, output_if
        }
        sample.u32(1); // num_records
        sample.u32(RECORD_RAW_PACKET_HEADER);
        sample.u32(raw_record.0.len() as u32);
        sample.bytes(&raw_record.0);

        sample.0
    }

    fn build_datagram(expanded: bool) -> Vec<u8> {
        let sample = build_sample_body(expanded);

        let mut datagram = Writer::new();
        datagram.u32(VERSION);
        datagram.u32(1); // agent address type v4
        datagram.bytes(&[192, 0, 2, 1]);
        datagram.u32(0); // sub_agent_id
        datagram.u32(42); // sequence_number
        datagram.u32(1000); // sys_up_time
        datagram.u32(1); // num_samples
        datagram.u32(if expanded { SAMPLE_EXPANDED_FLOW } else { SAMPLE_FLOW });
        datagram.u32(sample.len() as u32);
        datagram.bytes(&sample);

        datagram.0
    }

    #[test]
    fn decodes_a_standard_flow_sample() {
        let counters = SflowCounters::new_for_test();
        let agent: IpAddr = "192.0.2.100".parse().unwrap();
        let flows = decode(&build_datagram(false), agent, &no_op_resolver(), &counters).unwrap();
        assert_eq!(flows.len(), 1);
        let f = &flows[0];
        assert_eq!(f.agent, agent);
        assert_eq!(f.samplerate, 512);
        assert_eq!(f.int_in, "7");
        assert_eq!(f.int_out, "9");
        assert_eq!(f.size, 64);
        assert_eq!(f.packets, 1);
        assert_eq!(f.src_addr, "198.51.100.24".parse::<IpAddr>().unwrap());
        assert_eq!(f.dst_addr, "203.0.113.30".parse::<IpAddr>().unwrap());
        assert_eq!(f.protocol, 17);
    }

    #[test]
    fn decodes_an_expanded_flow_sample() {
        let counters = SflowCounters::new_for_test();
        let agent: IpAddr = "192.0.2.100".parse().unwrap();
        let flows = decode(&build_datagram(true), agent, &no_op_resolver(), &counters).unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].int_in, "7");
        assert_eq!(flows[0].int_out, "9");
    }

    #[test]
    fn rejects_unsupported_version() {
        let counters = SflowCounters::new_for_test();
        let mut w = Writer::new();
        w.u32(4);
        let err = decode(&w.0, "192.0.2.1".parse().unwrap(), &no_op_resolver(), &counters).unwrap_err();
        assert!(matches!(err, FlowhouseError::UnsupportedVersion(4)));
    }

    #[test]
    fn extended_switch_record_appends_vlan_suffix() {
        let counters = SflowCounters::new_for_test();
        let header = eth_ipv4_udp();

        let mut raw_record = Writer::new();
        raw_record.u32(1).u32(64).u32(0).u32(header.len() as u32).bytes(&header);

        let mut switch_record = Writer::new();
        switch_record.u32(10).u32(0).u32(20).u32(0); // in vlan, in prio, out vlan, out prio

        let mut sample = Writer::new();
        sample.u32(1).u32(0).u32(512).u32(0).u32(0).u32(7).u32(9);
        sample.u32(2); // num_records
        sample.u32(RECORD_RAW_PACKET_HEADER).u32(raw_record.0.len() as u32).bytes(&raw_record.0);
        sample
            .u32(RECORD_EXTENDED_SWITCH)
            .u32(switch_record.0.len() as u32)
            .bytes(&switch_record.0);

        let mut datagram = Writer::new();
        datagram.u32(VERSION).u32(1).bytes(&[192, 0, 2, 1]).u32(0).u32(1).u32(0).u32(1);
        datagram.u32(SAMPLE_FLOW).u32(sample.0.len() as u32).bytes(&sample.0);

        let flows = decode(&datagram.0, "192.0.2.1".parse().unwrap(), &no_op_resolver(), &counters).unwrap();
        assert_eq!(flows[0].int_in, "7.10");
        assert_eq!(flows[0].int_out, "9.20");
    }

    #[test]
    fn missing_raw_header_increments_counter_and_yields_no_flow() {
        let counters = SflowCounters::new_for_test();
        let mut sample = Writer::new();
        sample.u32(1).u32(0).u32(512).u32(0).u32(0).u32(7).u32(9);
        sample.u32(0); // num_records

        let mut datagram = Writer::new();
        datagram.u32(VERSION).u32(1).bytes(&[192, 0, 2, 1]).u32(0).u32(1).u32(0).u32(1);
        datagram.u32(SAMPLE_FLOW).u32(sample.0.len() as u32).bytes(&sample.0);

        let flows = decode(&datagram.0, "192.0.2.1".parse().unwrap(), &no_op_resolver(), &counters).unwrap();
        assert!(flows.is_empty());
        assert_eq!(counters.no_raw_header.get(), 1);
    }

    /// A truncated flow sample must not abort the whole datagram: the
    /// sample decode error is counted and the loop moves on, so a valid
    /// sample later in the same datagram still decodes (spec.md §4.1/§7:
    /// "never abort the datagram").
    #[test]
    fn truncated_sample_is_skipped_without_aborting_later_samples() {
        let counters = SflowCounters::new_for_test();
        let agent: IpAddr = "192.0.2.1".parse().unwrap();

        // Nowhere near enough bytes for decode_flow_sample's own fixed
        // fields (sequence_number, source_id, sampling_rate, sample_pool,
        // drops, input_if, output_if, num_records).
        let mut truncated = Writer::new();
        truncated.u32(1).u32(0);

        let valid = build_sample_body(false);

        let mut datagram = Writer::new();
        datagram.u32(VERSION).u32(1).bytes(&[192, 0, 2, 1]).u32(0).u32(1).u32(0);
        datagram.u32(2); // num_samples
        datagram.u32(SAMPLE_FLOW).u32(truncated.0.len() as u32).bytes(&truncated.0);
        datagram.u32(SAMPLE_FLOW).u32(valid.len() as u32).bytes(&valid);

        let flows = decode(&datagram.0, agent, &no_op_resolver(), &counters).unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].src_addr, "198.51.100.24".parse::<IpAddr>().unwrap());
        assert_eq!(counters.sample_decode_errors.get(), 1);
    }
}
