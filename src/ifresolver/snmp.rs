//! SNMP transport for the interface resolver. Bulk-walking an OID subtree
//! is externalized behind [`SnmpWalker`] — spec.md scopes the SNMP wire
//! protocol itself out, only the "walk a subtree, get (index, octet-string)
//! pairs" contract is ours to keep.

use crate::error::{FlowhouseError, Result};
use csnmp::{ObjectIdentifier, ObjectValue, Snmp2cClient};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;

const SNMP_PORT: u16 = 161;
const SNMP_TIMEOUT: Duration = Duration::from_secs(30);
const SNMP_RETRIES: usize = 0;

/// A bulk-walk of one OID subtree, returning the last sub-identifier of
/// each returned OID (the table index) paired with its octet-string value.
pub trait SnmpWalker: Send + Sync {
    fn bulk_walk<'a>(
        &'a self,
        target: IpAddr,
        community: &'a str,
        oid: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<(u32, String)>>> + Send + 'a>>;
}

/// The real SNMP v2c transport, backed by `csnmp`.
pub struct CsnmpWalker;

impl SnmpWalker for CsnmpWalker {
    fn bulk_walk<'a>(
        &'a self,
        target: IpAddr,
        community: &'a str,
        oid: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<(u32, String)>>> + Send + 'a>> {
        Box::pin(async move {
            let base: ObjectIdentifier = oid
                .parse()
                .map_err(|e| FlowhouseError::Snmp(format!("bad OID {oid}: {e}")))?;

            let addr = SocketAddr::new(target, SNMP_PORT);
            let client = Snmp2cClient::new(
                addr,
                community.as_bytes().to_vec().into(),
                Some(SNMP_TIMEOUT),
                SNMP_RETRIES,
            )
            .await
            .map_err(|e| FlowhouseError::Snmp(e.to_string()))?;

            let values = client
                .walk_bulk(base)
                .await
                .map_err(|e| FlowhouseError::Snmp(e.to_string()))?;

            let mut out = Vec::new();
            for (returned_oid, value) in values {
                let Some(index) = returned_oid.into_iter().last() else {
                    continue;
                };
                if let ObjectValue::String(bytes) = value {
                    if let Ok(s) = String::from_utf8(bytes) {
                        out.push((index, s));
                    }
                }
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A scripted walker for unit tests: keyed by (agent, oid), returns a
    /// canned result (or an error) instead of touching the network.
    #[derive(Default)]
    pub struct FakeSnmpWalker {
        pub responses: Mutex<HashMap<(IpAddr, String), Result<Vec<(u32, String)>>>>,
    }

    impl FakeSnmpWalker {
        pub fn set(&self, target: IpAddr, oid: &str, response: Vec<(u32, String)>) {
            self.responses
                .lock()
                .unwrap()
                .insert((target, oid.to_string()), Ok(response));
        }
    }

    impl SnmpWalker for FakeSnmpWalker {
        fn bulk_walk<'a>(
            &'a self,
            target: IpAddr,
            _community: &'a str,
            oid: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<(u32, String)>>> + Send + 'a>> {
            let result = self
                .responses
                .lock()
                .unwrap()
                .get(&(target, oid.to_string()))
                .map(|r| match r {
                    Ok(v) => Ok(v.clone()),
                    Err(_) => Err(FlowhouseError::Snmp("scripted failure".into())),
                })
                .unwrap_or_else(|| Ok(Vec::new()));
            Box::pin(async move { result })
        }
    }
}
