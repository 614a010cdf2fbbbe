use crate::config::RuntimeConfig;
use crate::graph::{Graph, GraphError, NodeId};
use crate::storage::{Properties, StorageError};
use crate::time::{TimeCache, TimeService};
use crate::vars::{Pools, VarRef, VariableTable};
use std::sync::Arc;

/// Services shared by every processor working on one graph store.
pub struct Runtime {
    graph: Arc<Graph>,
    properties: Properties,
    pools: Pools,
    variables: VariableTable,
    time: TimeService,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new(graph: Arc<Graph>, properties: Properties, config: RuntimeConfig) -> Arc<Self> {
        Arc::new(Self {
            time: TimeService::new(graph.clone(), properties.clone(), config.time_owner.clone()),
            pools: Pools::new(&config.pool),
            variables: VariableTable::new(),
            graph,
            properties,
            config,
        })
    }

    /// Fresh graph with in-memory properties and default settings.
    pub fn in_memory() -> Arc<Self> {
        Self::new(Arc::new(Graph::new()), Properties::in_memory(), RuntimeConfig::default())
    }

    pub fn graph(&self) -> &Arc<Graph> { &self.graph }
    pub fn properties(&self) -> &Properties { &self.properties }
    pub fn pools(&self) -> &Pools { &self.pools }
    pub fn variables(&self) -> &VariableTable { &self.variables }
    pub fn config(&self) -> &RuntimeConfig { &self.config }

    pub fn time(&self) -> Arc<TimeCache> {
        self.time.current()
    }

    pub fn time_service(&self) -> &TimeService {
        &self.time
    }

    /// Resolved variable wrapper for `id`, `None` for ordinary nodes.
    pub fn variable(&self, id: NodeId) -> Option<Arc<VarRef>> {
        self.variables.resolve(&self.graph, id)
    }

    /// Adds a link and drops cached lookups of the source variable.
    pub fn add_link(&self, from: NodeId, to: NodeId, meaning: NodeId) -> Result<(), GraphError> {
        self.graph.add_link(from, to, meaning)?;
        self.variables.invalidate(from);
        Ok(())
    }

    pub fn remove_link(&self, from: NodeId, to: NodeId, meaning: NodeId) -> bool {
        let removed = self.graph.remove_link(from, to, meaning);
        if removed {
            self.variables.invalidate(from);
        }
        removed
    }

    /// Call after the graph store was loaded or replaced.
    pub fn on_store_initialized(&self) {
        self.variables.clear();
        self.time.on_store_initialized();
    }

    /// Empties the graph store and everything derived from it.
    pub fn clear_store(&self) {
        self.graph.clear();
        self.variables.clear();
        self.time.on_store_cleared();
    }

    pub fn flush(&self) -> Result<usize, StorageError> {
        if !self.time.is_active() {
            return Ok(0);
        }
        self.time().flush()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.config.flush_on_drop {
            if let Err(e) = self.flush() {
                log::error!("Failed to flush calendar tables: {}", e);
            }
        }
    }
}
