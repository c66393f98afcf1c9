//! The upstream route-information streaming service is out of scope per
//! spec.md §1 ("consumed as an ordered sequence of add/withdraw updates per
//! prefix") — [`RouteStream`] is the consumption contract; `NewlineJsonRis`
//! is a minimal real transport (a long-lived TCP connection carrying one
//! JSON object per line) standing in for whatever RIS wire protocol a
//! deployment actually speaks, since none of the example repos carry a
//! gRPC RIS client to model this on directly.

use crate::model::Prefix;
use crate::routemirror::{AsPath, AsPathSegment};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum RouteUpdate {
    Add { prefix: Prefix, next_hop: IpAddr, as_path: AsPath },
    Withdraw { prefix: Prefix },
}

/// One upstream source of routing updates for a given (router, VRF,
/// address family). Implementations push [`RouteUpdate`]s into `tx` until
/// `shutdown` fires; the RIB-side merge writer is the single consumer.
pub trait RouteStream: Send + Sync {
    fn spawn(&self, router: IpAddr, vrf_rd: u64, family: u8, tx: mpsc::Sender<RouteUpdate>, shutdown: watch::Receiver<bool>);
}

pub struct NewlineJsonRis {
    pub upstream: String,
}

#[derive(Deserialize)]
struct WireUpdate {
    #[serde(rename = "type")]
    kind: String,
    prefix: IpAddr,
    length: u8,
    #[serde(default)]
    next_hop: Option<IpAddr>,
    #[serde(default)]
    as_path: Vec<Vec<u32>>,
}

impl RouteStream for NewlineJsonRis {
    fn spawn(&self, router: IpAddr, vrf_rd: u64, family: u8, tx: mpsc::Sender<RouteUpdate>, mut shutdown: watch::Receiver<bool>) {
        let upstream = self.upstream.clone();
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    return;
                }

                match TcpStream::connect(&upstream).await {
                    Ok(stream) => {
                        let mut lines = BufReader::new(stream).lines();
                        loop {
                            tokio::select! {
                                line = lines.next_line() => {
                                    match line {
                                        Ok(Some(raw)) => {
                                            if let Some(update) = parse_line(&raw, family) {
                                                if tx.send(update).await.is_err() {
                                                    return;
                                                }
                                            }
                                        }
                                        _ => break,
                                    }
                                }
                                _ = shutdown.changed() => {
                                    if *shutdown.borrow() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(%router, vrf_rd, %upstream, error = %e, "RIS stream connect failed");
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }
}

fn parse_line(raw: &str, family: u8) -> Option<RouteUpdate> {
    let wire: WireUpdate = serde_json::from_str(raw).ok()?;
    let wire_family = if wire.prefix.is_ipv4() { 4 } else { 6 };
    if wire_family != family {
        return None;
    }

    let prefix = Prefix::new(wire.prefix, wire.length);
    match wire.kind.as_str() {
        "withdraw" => Some(RouteUpdate::Withdraw { prefix }),
        "add" => {
            let next_hop = wire.next_hop.unwrap_or(wire.prefix);
            let as_path = AsPath {
                segments: wire.as_path.into_iter().map(|asns| AsPathSegment { asns }).collect(),
            };
            Some(RouteUpdate::Add { prefix, next_hop, as_path })
        }
        _ => None,
    }
}
