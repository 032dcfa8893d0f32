use once_cell::sync::Lazy;

// TODO: Will change the below to match partitions, but for now only one
// worker per topic is used.
pub const WORKERS_PER_TOPIC: usize = 1;

/// One catalog row: a topic name and how many worker slots it gets.
#[derive(Debug, Clone)]
pub struct TopicEntry {
    pub name: String,
    pub replicas: usize,
}

/// Fixed, ordered list of topics the consumer attaches to.
///
/// The order is significant: worker ids are assigned by walking the catalog
/// front to back, one id per (topic, replica) slot.
///
#[derive(Debug, Clone)]
pub struct TopicCatalog {
    entries: Vec<TopicEntry>,
}

impl TopicCatalog {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, replicas)| TopicEntry {
                    name: name.into(),
                    replicas,
                })
                .collect(),
        }
    }

    #[allow(dead_code)]
    pub fn entries(&self) -> &[TopicEntry] {
        &self.entries
    }

    pub fn topic_count(&self) -> usize {
        self.entries.len()
    }

    /// Total worker slots: the sum of replica counts over all topics.
    pub fn pool_size(&self) -> usize {
        self.entries.iter().map(|e| e.replicas).sum()
    }

    /// Topic name per slot, in worker-id order.
    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|e| std::iter::repeat_n(e.name.as_str(), e.replicas))
    }
}

/// The openbmp.parsed.* topic set consumed by this process.
pub static OPENBMP_CATALOG: Lazy<TopicCatalog> = Lazy::new(|| {
    TopicCatalog::from_entries([
        ("openbmp.parsed.collector", WORKERS_PER_TOPIC),
        ("openbmp.parsed.router", WORKERS_PER_TOPIC),
        ("openbmp.parsed.peer", WORKERS_PER_TOPIC),
        ("openbmp.parsed.base_attribute", WORKERS_PER_TOPIC),
        ("openbmp.parsed.unicast_prefix", WORKERS_PER_TOPIC),
        ("openbmp.parsed.bmp_stat", WORKERS_PER_TOPIC),
        ("openbmp.parsed.ls_node", WORKERS_PER_TOPIC),
        ("openbmp.parsed.ls_link", WORKERS_PER_TOPIC),
        ("openbmp.parsed.ls_prefix", WORKERS_PER_TOPIC),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_is_sum_of_replicas() {
        let catalog = TopicCatalog::from_entries([("alpha", 1), ("beta", 2), ("gamma", 3)]);
        assert_eq!(catalog.pool_size(), 6);
        assert_eq!(catalog.topic_count(), 3);
    }

    #[test]
    fn slots_follow_catalog_order() {
        let catalog = TopicCatalog::from_entries([("alpha", 1), ("beta", 2)]);
        let slots: Vec<&str> = catalog.slots().collect();
        assert_eq!(slots, vec!["alpha", "beta", "beta"]);
    }

    #[test]
    fn openbmp_catalog_has_nine_single_replica_topics() {
        assert_eq!(OPENBMP_CATALOG.topic_count(), 9);
        assert_eq!(OPENBMP_CATALOG.pool_size(), 9);
        assert!(
            OPENBMP_CATALOG
                .entries()
                .iter()
                .all(|e| e.name.starts_with("openbmp.parsed.") && e.replicas == 1)
        );
    }
}
