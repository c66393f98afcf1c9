use thiserror::Error;

/// Crate-wide error taxonomy. Protocol errors and resolution misses are
/// recoverable at the call site (drop the record, bump a counter, keep
/// going); `Config` and socket-bind failures (surfaced as `Io`) are meant
/// to abort the process at startup instead.
#[derive(Error, Debug)]
pub enum FlowhouseError {
    /// Datagram declared a version we don't speak (sFlow != 5, IPFIX != 10).
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// Buffer ran out while a fixed-size field was being read.
    #[error("short frame: needed {needed} bytes, had {available}")]
    ShortFrame { needed: usize, available: usize },

    /// IPFIX template field carried an enterprise-specific information element.
    #[error("enterprise information elements are not supported")]
    EnterpriseTlvUnsupported,

    /// Router name has no route-mirror target registered.
    #[error("router unknown: {0}")]
    RouterUnknown(String),

    /// VRF route-distinguisher has no RIB registered for a known router.
    #[error("VRF unknown: {0}")]
    VrfUnknown(u64),

    /// LPM query produced no covering route.
    #[error("no route found for {0}")]
    NoRoute(std::net::IpAddr),

    /// SNMP walk failed or timed out.
    #[error("SNMP error: {0}")]
    Snmp(String),

    /// Upstream route-stream connection failed or was reset.
    #[error("route stream error: {0}")]
    RouteStream(String),

    /// Columnar store transaction failed.
    #[error("store error: {0}")]
    Store(String),

    /// YAML configuration failed to parse or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlowhouseError>;
