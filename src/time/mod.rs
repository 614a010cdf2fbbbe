//! Calendar constants and time clusters.

pub mod cache;
pub mod tables;

pub use cache::TimeCache;
pub use tables::{CalendarTable, YearTable};

use crate::graph::{Graph, NodeId};
use crate::storage::Properties;
use parking_lot::RwLock;
use std::sync::Arc;

/// Receives composites built on behalf of an evaluation, so they can be
/// reclaimed once that evaluation is done with them.
pub trait Freezer {
    fn freeze(&mut self, node: NodeId);
}

/// Owns the time cache for the lifetime of one graph store.
pub struct TimeService {
    graph: Arc<Graph>,
    properties: Properties,
    owner: String,
    current: RwLock<Option<Arc<TimeCache>>>,
}

impl TimeService {
    pub fn new(graph: Arc<Graph>, properties: Properties, owner: impl Into<String>) -> Self {
        Self {
            graph,
            properties,
            owner: owner.into(),
            current: RwLock::new(None),
        }
    }

    /// The active cache, created on first use.
    pub fn current(&self) -> Arc<TimeCache> {
        if let Some(cache) = self.current.read().as_ref() {
            return cache.clone();
        }
        self.current
            .write()
            .get_or_insert_with(|| Arc::new(self.create()))
            .clone()
    }

    fn create(&self) -> TimeCache {
        TimeCache::new(self.graph.clone(), self.properties.clone(), self.owner.clone())
    }

    pub fn is_active(&self) -> bool {
        self.current.read().is_some()
    }

    /// Rebuilds the cache from the property store after the graph was (re)loaded.
    pub fn on_store_initialized(&self) -> Arc<TimeCache> {
        let cache = Arc::new(self.create());
        cache.preload();
        if let Some(old) = self.current.write().replace(cache.clone()) {
            old.reset();
        }
        cache
    }

    /// Drops every table and the cache itself; nothing is flushed.
    pub fn on_store_cleared(&self) {
        if let Some(old) = self.current.write().take() {
            old.reset();
        }
    }
}
