//! Minimal inner-packet walker for sFlow raw packet headers: Ethernet II,
//! optional single 802.1Q tag, IPv4/IPv6, and TCP/UDP ports. Field names
//! follow `etherparse`'s conventions even though the parsing itself is
//! hand-rolled over our bounded [`Cursor`](crate::decode::cursor::Cursor)
//! rather than that crate's slice types.

use crate::decode::cursor::Cursor;
use crate::metrics::SflowCounters;
use std::net::IpAddr;

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const ETHER_TYPE_IPV6: u16 = 0x86DD;
pub const ETHER_TYPE_VLAN: u16 = 0x8100;
pub const ETHER_TYPE_ARP: u16 = 0x0806;
pub const ETHER_TYPE_LACP: u16 = 0x8809;

pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

/// Result of walking one raw Ethernet frame: whatever we could resolve
/// about the L3/L4 headers it carries. Fields stay `None` when the frame
/// doesn't carry that layer (e.g. no L4 ports on an ICMP packet).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InnerPacket {
    pub src_addr: Option<IpAddr>,
    pub dst_addr: Option<IpAddr>,
    pub protocol: Option<u8>,
    pub family: Option<u8>,
    pub tos: Option<u8>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub vlan_id: Option<u16>,
}

/// Walks an Ethernet frame, returning `None` only when the frame is too
/// short to even hold an Ethernet header (short frames are reported via the
/// `ethernet` counter, not propagated as an error, per the "never abort the
/// datagram" rule of the sFlow decoder).
pub fn decode_ethernet(buf: &[u8], counters: &SflowCounters) -> Option<InnerPacket> {
    let mut cur = Cursor::new(buf);
    // destination MAC, source MAC
    if cur.skip(12).is_err() {
        counters.ethernet_errors.inc();
        return None;
    }
    let mut ether_type = match cur.read_u16() {
        Ok(v) => v,
        Err(_) => {
            counters.ethernet_errors.inc();
            return None;
        }
    };

    let mut pkt = InnerPacket::default();

    if ether_type == ETHER_TYPE_VLAN {
        let tci = match cur.read_u16() {
            Ok(v) => v,
            Err(_) => {
                counters.dot1q_errors.inc();
                return None;
            }
        };
        pkt.vlan_id = Some(tci & 0x0FFF);
        ether_type = match cur.read_u16() {
            Ok(v) => v,
            Err(_) => {
                counters.dot1q_errors.inc();
                return None;
            }
        };
    }

    match ether_type {
        ETHER_TYPE_IPV4 => decode_ipv4(&mut cur, &mut pkt, counters),
        ETHER_TYPE_IPV6 => decode_ipv6(&mut cur, &mut pkt, counters),
        ETHER_TYPE_ARP | ETHER_TYPE_LACP => {}
        _ => counters.unknown_ethertype.inc(),
    }

    Some(pkt)
}

fn decode_ipv4(cur: &mut Cursor<'_>, pkt: &mut InnerPacket, counters: &SflowCounters) {
    let versioned_ihl = match cur.read_u8() {
        Ok(v) => v,
        Err(_) => {
            counters.ipv4_errors.inc();
            return;
        }
    };
    let ihl = (versioned_ihl & 0x0F) as usize;
    let tos = match cur.read_u8() {
        Ok(v) => v,
        Err(_) => {
            counters.ipv4_errors.inc();
            return;
        }
    };
    // total length, identification, flags+fragment offset, ttl
    if cur.skip(2 + 2 + 2 + 1).is_err() {
        counters.ipv4_errors.inc();
        return;
    }
    let protocol = match cur.read_u8() {
        Ok(v) => v,
        Err(_) => {
            counters.ipv4_errors.inc();
            return;
        }
    };
    // header checksum
    if cur.skip(2).is_err() {
        counters.ipv4_errors.inc();
        return;
    }
    let src = match cur.read_ipv4() {
        Ok(v) => v,
        Err(_) => {
            counters.ipv4_errors.inc();
            return;
        }
    };
    let dst = match cur.read_ipv4() {
        Ok(v) => v,
        Err(_) => {
            counters.ipv4_errors.inc();
            return;
        }
    };

    // skip any IPv4 options beyond the fixed 20-byte header (ihl is in 32-bit words)
    if ihl > 5 && cur.skip((ihl - 5) * 4).is_err() {
        counters.ipv4_errors.inc();
        return;
    }

    pkt.family = Some(4);
    pkt.tos = Some(tos);
    pkt.protocol = Some(protocol);
    pkt.src_addr = Some(IpAddr::V4(src));
    pkt.dst_addr = Some(IpAddr::V4(dst));

    decode_l4(cur, protocol, pkt, counters);
}

fn decode_ipv6(cur: &mut Cursor<'_>, pkt: &mut InnerPacket, counters: &SflowCounters) {
    let first = match cur.read_u32() {
        Ok(v) => v,
        Err(_) => {
            counters.ipv6_errors.inc();
            return;
        }
    };
    let tos = ((first >> 20) & 0xFF) as u8;
    // payload length
    if cur.skip(2).is_err() {
        counters.ipv6_errors.inc();
        return;
    }
    let next_header = match cur.read_u8() {
        Ok(v) => v,
        Err(_) => {
            counters.ipv6_errors.inc();
            return;
        }
    };
    // hop limit
    if cur.skip(1).is_err() {
        counters.ipv6_errors.inc();
        return;
    }
    let src = match cur.read_ipv6() {
        Ok(v) => v,
        Err(_) => {
            counters.ipv6_errors.inc();
            return;
        }
    };
    let dst = match cur.read_ipv6() {
        Ok(v) => v,
        Err(_) => {
            counters.ipv6_errors.inc();
            return;
        }
    };

    pkt.family = Some(6);
    pkt.tos = Some(tos);
    pkt.protocol = Some(next_header);
    pkt.src_addr = Some(IpAddr::V6(src));
    pkt.dst_addr = Some(IpAddr::V6(dst));

    decode_l4(cur, next_header, pkt, counters);
}

fn decode_l4(cur: &mut Cursor<'_>, protocol: u8, pkt: &mut InnerPacket, counters: &SflowCounters) {
    match protocol {
        PROTO_TCP => match (cur.read_u16(), cur.read_u16()) {
            (Ok(sp), Ok(dp)) => {
                pkt.src_port = Some(sp);
                pkt.dst_port = Some(dp);
            }
            _ => counters.tcp_errors.inc(),
        },
        PROTO_UDP => match (cur.read_u16(), cur.read_u16()) {
            (Ok(sp), Ok(dp)) => {
                pkt.src_port = Some(sp);
                pkt.dst_port = Some(dp);
            }
            _ => counters.udp_errors.inc(),
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SflowCounters;

    fn eth_ipv4_udp(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 14];
        buf[12] = 0x08;
        buf[13] = 0x00; // IPv4
        buf.extend_from_slice(&[0x45, 0x00]); // version/ihl, tos
        buf.extend_from_slice(&[0, 28]); // total length
        buf.extend_from_slice(&[0, 0]); // id
        buf.extend_from_slice(&[0, 0]); // flags/frag
        buf.push(64); // ttl
        buf.push(PROTO_UDP);
        buf.extend_from_slice(&[0, 0]); // checksum
        buf.extend_from_slice(&src);
        buf.extend_from_slice(&dst);
        buf.extend_from_slice(&sport.to_be_bytes());
        buf.extend_from_slice(&dport.to_be_bytes());
        buf
    }

    #[test]
    fn decodes_ethernet_ipv4_udp() {
        let counters = SflowCounters::new_for_test();
        let buf = eth_ipv4_udp([198, 51, 100, 24], [203, 0, 113, 30], 34567, 443);
        let pkt = decode_ethernet(&buf, &counters).unwrap();
        assert_eq!(pkt.family, Some(4));
        assert_eq!(pkt.protocol, Some(PROTO_UDP));
        assert_eq!(pkt.src_port, Some(34567));
        assert_eq!(pkt.dst_port, Some(443));
        assert_eq!(pkt.src_addr, Some("198.51.100.24".parse().unwrap()));
        assert_eq!(pkt.dst_addr, Some("203.0.113.30".parse().unwrap()));
    }

    #[test]
    fn dot1q_tag_is_consumed_and_vlan_recorded() {
        let counters = SflowCounters::new_for_test();
        let mut buf = vec![0u8; 12];
        buf.extend_from_slice(&ETHER_TYPE_VLAN.to_be_bytes());
        buf.extend_from_slice(&[0x00, 0x2A]); // TCI: vlan id 42
        buf.extend_from_slice(&ETHER_TYPE_IPV4.to_be_bytes());
        let inner = eth_ipv4_udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2);
        buf.extend_from_slice(&inner[14..]);

        let pkt = decode_ethernet(&buf, &counters).unwrap();
        assert_eq!(pkt.vlan_id, Some(42));
        assert_eq!(pkt.family, Some(4));
    }

    #[test]
    fn arp_is_silently_ignored() {
        let counters = SflowCounters::new_for_test();
        let mut buf = vec![0u8; 12];
        buf.extend_from_slice(&ETHER_TYPE_ARP.to_be_bytes());
        let pkt = decode_ethernet(&buf, &counters).unwrap();
        assert_eq!(pkt.family, None);
        assert_eq!(counters.unknown_ethertype.get(), 0);
    }

    #[test]
    fn unknown_ethertype_increments_counter() {
        let counters = SflowCounters::new_for_test();
        let mut buf = vec![0u8; 12];
        buf.extend_from_slice(&0x1234u16.to_be_bytes());
        let pkt = decode_ethernet(&buf, &counters).unwrap();
        assert_eq!(pkt.family, None);
        assert_eq!(counters.unknown_ethertype.get(), 1);
    }
}
