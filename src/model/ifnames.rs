//! Per-agent interface index/name map, rebuilt wholesale on every SNMP refresh.

use std::collections::HashMap;

/// Bidirectional `ifIndex <-> ifName` map for a single agent. A refresh
/// replaces the whole map in one shot so concurrent readers never observe a
/// partially-populated map (either the old generation or the new one).
#[derive(Debug, Clone, Default)]
pub struct InterfaceMap {
    by_index: HashMap<u32, String>,
}

impl InterfaceMap {
    pub fn from_entries(entries: impl IntoIterator<Item = (u32, String)>) -> Self {
        Self {
            by_index: entries.into_iter().collect(),
        }
    }

    pub fn resolve(&self, if_index: u32) -> Option<&str> {
        self.by_index.get(&if_index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_returns_none_on_miss() {
        let m = InterfaceMap::from_entries([(1, "ge-0/0/0".to_string())]);
        assert_eq!(m.resolve(1), Some("ge-0/0/0"));
        assert_eq!(m.resolve(2), None);
    }
}
