//! Shared UDP read loop for the sFlow and IPFIX servers (C8).
//!
//! Grounded on `original_source/pkg/servers/sflow/sfserver.go`'s
//! `packetWorker`: one `ReadFromUDP` loop per reader goroutine, normalizing
//! a v4-mapped-into-v6 source address back to plain v4 before it becomes
//! `Flow::agent` (`remote.IP.To4()`), bumping a per-agent `packetsReceived`
//! counter, then handing the datagram off to a protocol-specific decode
//! closure. `ipfix_server.go`'s `packetWorker` is the same shape without
//! the per-protocol error counters sFlow carries.

use crate::metrics::Metrics;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

pub const DATAGRAM_BUF: usize = 8960;

/// Folds a v4-mapped-into-v6 source address back to plain v4, matching the
/// Go original's `remote.IP.To4()` check.
pub fn normalize_agent(addr: SocketAddr) -> IpAddr {
    match addr.ip() {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        other => other,
    }
}

/// Spawns `num_workers` tasks that all `recv_from` the same socket, each
/// invoking `handle` with the normalized agent address and the datagram
/// bytes. Every worker shares one `shutdown` watch and exits once it fires
/// or the socket itself errors out.
pub fn spawn_workers<F>(
    socket: Arc<UdpSocket>,
    num_workers: usize,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
    handle: F,
) -> Vec<JoinHandle<()>>
where
    F: Fn(IpAddr, &[u8]) + Send + Sync + Clone + 'static,
{
    (0..num_workers)
        .map(|_| {
            let socket = Arc::clone(&socket);
            let metrics = Arc::clone(&metrics);
            let mut shutdown = shutdown.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; DATAGRAM_BUF];
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                        res = socket.recv_from(&mut buf) => {
                            match res {
                                Ok((len, from)) => {
                                    let agent = normalize_agent(from);
                                    metrics.packets_received(&agent.to_string()).inc();
                                    handle(agent, &buf[..len]);
                                }
                                Err(e) => {
                                    warn!(error = %e, "UDP recv_from failed");
                                    return;
                                }
                            }
                        }
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_mapped_v6_source_folds_to_plain_v4() {
        let mapped: SocketAddr = "[::ffff:192.0.2.1]:6343".parse().unwrap();
        assert_eq!(normalize_agent(mapped), "192.0.2.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn plain_v4_source_is_unchanged() {
        let plain: SocketAddr = "192.0.2.1:6343".parse().unwrap();
        assert_eq!(normalize_agent(plain), "192.0.2.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn genuine_v6_source_is_unchanged() {
        let v6: SocketAddr = "[2001:db8::1]:6343".parse().unwrap();
        assert_eq!(normalize_agent(v6), "2001:db8::1".parse::<IpAddr>().unwrap());
    }
}
