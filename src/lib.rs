//! sFlow v5 / IPFIX v10 flow collector: decode, enrich, aggregate, persist.
//!
//! See `supervisor` for how the pieces below are wired together into a
//! running process, and `config` for the YAML schema that drives it.

pub mod aggregator;
pub mod annotator;
pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod http;
pub mod ifresolver;
pub mod metrics;
pub mod model;
pub mod routemirror;
pub mod servers;
pub mod supervisor;
pub mod writer;
