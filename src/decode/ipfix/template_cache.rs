//! Per-(agent, observation domain, template id) template cache.
//!
//! Grounded on `ipfix_template_cache.go`: a single `RwLock<HashMap<...>>`,
//! one write per Template Set seen, many concurrent reads per Data Set.

use super::Template;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    agent: IpAddr,
    domain_id: u32,
    template_id: u16,
}

#[derive(Default)]
pub struct TemplateCache {
    cache: RwLock<HashMap<Key, Template>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, agent: IpAddr, domain_id: u32, template: Template) {
        let key = Key {
            agent,
            domain_id,
            template_id: template.template_id,
        };
        self.cache.write().expect("template cache lock poisoned").insert(key, template);
    }

    pub fn get(&self, agent: IpAddr, domain_id: u32, template_id: u16) -> Option<Template> {
        let key = Key { agent, domain_id, template_id };
        self.cache.read().expect("template cache lock poisoned").get(&key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::ipfix::Field;

    #[test]
    fn template_overwrite_replaces_the_previous_shape() {
        let cache = TemplateCache::new();
        let agent: IpAddr = "192.0.2.1".parse().unwrap();

        cache.set(
            agent,
            1,
            Template {
                template_id: 256,
                fields: vec![Field { field_type: 8, length: 4 }],
                is_options: false,
            },
        );
        assert_eq!(cache.get(agent, 1, 256).unwrap().fields.len(), 1);

        cache.set(
            agent,
            1,
            Template {
                template_id: 256,
                fields: vec![Field { field_type: 8, length: 4 }, Field { field_type: 12, length: 4 }],
                is_options: false,
            },
        );
        assert_eq!(cache.get(agent, 1, 256).unwrap().fields.len(), 2);
    }

    #[test]
    fn is_options_flag_is_preserved_through_set_and_get() {
        let cache = TemplateCache::new();
        let agent: IpAddr = "192.0.2.1".parse().unwrap();

        cache.set(
            agent,
            1,
            Template {
                template_id: 512,
                fields: vec![Field { field_type: 34, length: 4 }],
                is_options: true,
            },
        );
        assert!(cache.get(agent, 1, 512).unwrap().is_options);
    }

    #[test]
    fn unknown_template_id_misses() {
        let cache = TemplateCache::new();
        assert!(cache.get("192.0.2.1".parse().unwrap(), 1, 999).is_none());
    }
}
