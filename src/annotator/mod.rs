//! Routing-context annotator (C6): fills in `src_pfx`/`dst_pfx`/`src_as`/
//! `dst_as`/`next_as` from the route mirror's RIB. A resolution miss
//! (unknown router, unknown VRF, or no covering route) leaves those fields
//! at their zero value — the flow is still forwarded to the aggregator,
//! never dropped, per spec.md §7's "Resolution-miss" handling.
//!
//! Grounded on `original_source/pkg/ipannotator/ipannotator.go`: source AS
//! comes from the first ASN of the first AS-path segment of the *source*
//! route; destination AS comes from the last ASN of the last segment of
//! the *destination* route; `next_as` comes from the first ASN of the
//! first segment of that same destination route (not the source route).

use crate::model::Flow;
use crate::routemirror::RouteMirror;
use std::sync::Arc;
use tracing::debug;

pub struct Annotator {
    mirror: Arc<RouteMirror>,
}

impl Annotator {
    pub fn new(mirror: Arc<RouteMirror>) -> Self {
        Self { mirror }
    }

    /// Annotates `flow` in place. Never fails: a resolution miss is logged
    /// at debug level and simply leaves the relevant fields unset.
    pub fn annotate(&self, flow: &mut Flow) {
        match self.mirror.lpm(flow.agent, flow.vrf_in, flow.src_addr) {
            Ok(Some(route)) => {
                flow.src_pfx = route.prefix;
                if let Some(asn) = route.as_path.first_segment_first_asn() {
                    flow.src_as = asn;
                }
            }
            Ok(None) => debug!(agent = %flow.agent, addr = %flow.src_addr, "no route for source address"),
            Err(e) => debug!(agent = %flow.agent, error = %e, "source route lookup failed"),
        }

        match self.mirror.lpm(flow.agent, flow.vrf_out, flow.dst_addr) {
            Ok(Some(route)) => {
                flow.dst_pfx = route.prefix;
                if let Some(asn) = route.as_path.last_segment_last_asn() {
                    flow.dst_as = asn;
                }
                if let Some(asn) = route.as_path.first_segment_first_asn() {
                    flow.next_as = asn;
                }
            }
            Ok(None) => debug!(agent = %flow.agent, addr = %flow.dst_addr, "no route for destination address"),
            Err(e) => debug!(agent = %flow.agent, error = %e, "destination route lookup failed"),
        }
    }
}
