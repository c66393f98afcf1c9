//! Wire-format decoders: sFlow v5 and IPFIX v10, plus the shared inner-packet
//! walker they both hand raw Ethernet payloads to.

pub mod cursor;
pub mod ipfix;
pub mod packet;
pub mod sflow;
