//! Ambient HTTP surface: `GET /healthz` and `GET /metrics`, per SPEC_FULL.md
//! §4.11. A full SQL query frontend (`original_source/pkg/frontend`) is out
//! of scope; this is just enough surface for a load balancer health check
//! and a Prometheus scrape target.
//!
//! Hand-rolled over `std::net::TcpListener` rather than pulling in a web
//! framework — the teacher's dependency stack has none, and this crate's
//! own surface (two fixed routes, no routing/middleware needs) doesn't
//! justify adding one. Blocking I/O is contained to a dedicated
//! `tokio::task::spawn_blocking`-free OS thread per connection, kept off
//! the async runtime entirely.

use crate::metrics::Metrics;
use prometheus::{Encoder, TextEncoder};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;
use tracing::{error, warn};

pub struct HttpServer {
    listener_thread: JoinHandle<()>,
    stop_tx: std_mpsc::Sender<()>,
    pub local_addr: SocketAddr,
}

impl HttpServer {
    /// Binds `listen` and spawns a dedicated OS thread that accepts and
    /// serves connections synchronously. Returns once the socket is bound,
    /// matching the other servers' `bind`-then-background-work shape.
    pub fn bind(listen: SocketAddr, metrics: Arc<Metrics>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(listen)?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let listener_thread = std::thread::spawn(move || {
            loop {
                if stop_rx.try_recv().is_ok() {
                    return;
                }
                match listener.accept() {
                    Ok((stream, _)) => {
                        let metrics = Arc::clone(&metrics);
                        if let Err(e) = stream.set_nonblocking(false) {
                            warn!(error = %e, "http: failed to set connection blocking");
                            continue;
                        }
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handle_connection(stream, &metrics)));
                        match result {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => warn!(error = %e, "http: connection handling failed"),
                            Err(_) => error!("http: request handler panicked, connection dropped"),
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(std::time::Duration::from_millis(50));
                    }
                    Err(e) => {
                        error!(error = %e, "http: accept failed, stopping listener");
                        return;
                    }
                }
            }
        });

        Ok(Self { listener_thread, stop_tx, local_addr })
    }

    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.listener_thread.join();
    }
}

fn handle_connection(mut stream: TcpStream, metrics: &Metrics) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    let path = request_line.split_whitespace().nth(1).unwrap_or("/");

    let (status, content_type, body) = match path {
        "/healthz" => ("200 OK", "text/plain", b"ok\n".to_vec()),
        "/metrics" => match render_metrics(metrics) {
            Ok(body) => ("200 OK", "text/plain; version=0.0.4", body),
            Err(e) => {
                error!(error = %e, "http: failed to render metrics");
                ("500 Internal Server Error", "text/plain", b"metrics encode error\n".to_vec())
            }
        },
        _ => ("404 Not Found", "text/plain", b"not found\n".to_vec()),
    };

    let header = format!("HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
    stream.write_all(header.as_bytes())?;
    stream.write_all(&body)?;
    stream.flush()
}

fn render_metrics(metrics: &Metrics) -> Result<Vec<u8>, prometheus::Error> {
    let families = metrics.registry.gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    Ok(buf)
}
