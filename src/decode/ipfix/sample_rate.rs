//! Per-(agent, observation domain) sampling-rate cache, populated from
//! Options Data Sets that carry a `samplingInterval` field (IE 34).
//!
//! Grounded on `sample_rate_cache.go`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    agent: IpAddr,
    domain_id: u32,
}

#[derive(Default)]
pub struct SampleRateCache {
    data: RwLock<HashMap<Key, u32>>,
}

impl SampleRateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, agent: IpAddr, domain_id: u32, rate: u32) {
        self.data
            .write()
            .expect("sample rate cache lock poisoned")
            .insert(Key { agent, domain_id }, rate);
    }

    /// Returns 0 (the Go zero value) when no rate has been observed yet.
    pub fn get(&self, agent: IpAddr, domain_id: u32) -> u32 {
        *self
            .data
            .read()
            .expect("sample rate cache lock poisoned")
            .get(&Key { agent, domain_id })
            .unwrap_or(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_rate_defaults_to_zero() {
        let cache = SampleRateCache::new();
        assert_eq!(cache.get("192.0.2.1".parse().unwrap(), 1), 0);
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = SampleRateCache::new();
        let agent: IpAddr = "192.0.2.1".parse().unwrap();
        cache.set(agent, 1, 512);
        assert_eq!(cache.get(agent, 1), 512);
        assert_eq!(cache.get(agent, 2), 0);
    }
}
