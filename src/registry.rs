use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use log::warn;

/// Shared map of active router connections, keyed by collector.
///
/// Layout: `collector hash id -> router ip -> reference count`.
///
/// Every worker that touches the collector, router, or peer topics mutates
/// this map while the others read it, so it has to hold up under concurrent
/// access. The outer map is sharded (DashMap), which keeps updates for
/// unrelated collectors off each other's locks; the inner per-collector map
/// is only ever touched under its shard guard.
///
/// Counts never go below zero. An entry that reaches zero is removed so the
/// map does not grow without bound across collector restarts.
#[derive(Clone, Default)]
pub struct RouterConnectionRegistry {
    inner: Arc<DashMap<String, HashMap<String, u32>>>,
}

// The mutating operations are driven by the storage handler as it decodes
// collector, router, and peer events; the core only owns and shares the map.
#[allow(dead_code)]
impl RouterConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more active connection between a collector and a router.
    ///
    /// Creates the entry at 1 when it is absent. Returns the new count.
    pub fn increment(&self, collector: &str, router: &str) -> u32 {
        let mut routers = self.inner.entry(collector.to_string()).or_default();
        let count = routers.entry(router.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Records one connection going away.
    ///
    /// The producer side does not order events across topics, so a down
    /// event can arrive before the matching up event was ever seen. That
    /// case is clamped at zero and logged, never treated as an error.
    /// Returns the remaining count.
    pub fn decrement(&self, collector: &str, router: &str) -> u32 {
        let remaining = match self.inner.get_mut(collector) {
            Some(mut routers) => match routers.get_mut(router) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    let remaining = *count;
                    if remaining == 0 {
                        routers.remove(router);
                    }
                    Some(remaining)
                }
                _ => None,
            },
            None => None,
        };

        match remaining {
            Some(count) => {
                // Drop empty collector entries to bound memory.
                if count == 0 {
                    self.inner.remove_if(collector, |_, routers| routers.is_empty());
                }
                count
            }
            None => {
                warn!(
                    "Ignoring connection-down for unknown router {} on collector {}",
                    router, collector
                );
                0
            }
        }
    }

    /// Point-in-time view of a collector's router counts.
    ///
    /// Safe to call while workers mutate other collectors; the clone happens
    /// under the shard guard for this collector only.
    pub fn snapshot(&self, collector: &str) -> HashMap<String, u32> {
        self.inner
            .get(collector)
            .map(|routers| routers.clone())
            .unwrap_or_default()
    }

    /// Current count for one (collector, router) pair; 0 when absent.
    pub fn count(&self, collector: &str, router: &str) -> u32 {
        self.inner
            .get(collector)
            .and_then(|routers| routers.get(router).copied())
            .unwrap_or(0)
    }

    /// Number of collectors with at least one active router connection.
    pub fn collector_count(&self) -> usize {
        self.inner.len()
    }
}
