//! Variable nodes and the scoped storage behind them.

pub mod pool;
pub mod system;
pub mod values;
pub mod variable;

pub use pool::{BufferPool, PoolStats, PooledBuffer, Pools};
pub use system::SystemVar;
pub use values::{Binding, NodeList, ScopeTier, VarScope};
pub use variable::{SplitReaction, ValueKind, Variable};

use crate::graph::{Graph, NodeId, NodeKind, VarTag};
use crate::processor::Processor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum VarError {
    #[error("Variable wrapper requested for the empty node")]
    NullNode,
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),
    #[error("Node {0:?} is not a variable")]
    NotAVariable(NodeId),
    #[error("Node {0:?} is tagged as a system variable but is not one")]
    UnknownSystemVariable(NodeId),
}

/// A scalar read through a variable's declared value kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Double(f64),
    Bool(bool),
    None,
}

/// Every kind of variable node, resolved once per node.
#[derive(Debug)]
pub enum VarRef {
    Variable(Variable),
    Local(Variable),
    Global(Variable),
    System(SystemVar),
    Time,
}

impl VarRef {
    pub fn resolve(graph: &Graph, id: NodeId) -> Result<Self, VarError> {
        match graph.kind(id) {
            Some(NodeKind::Variable(VarTag::System)) => SystemVar::from_id(id)
                .map(VarRef::System)
                .ok_or(VarError::UnknownSystemVariable(id)),
            Some(NodeKind::Variable(VarTag::Time)) => Ok(VarRef::Time),
            Some(NodeKind::Variable(VarTag::Local)) => Ok(VarRef::Local(Variable::new(graph, id)?)),
            Some(NodeKind::Variable(VarTag::Global)) => Ok(VarRef::Global(Variable::new(graph, id)?)),
            Some(NodeKind::Variable(VarTag::Variable)) => Ok(VarRef::Variable(Variable::new(graph, id)?)),
            Some(_) => Err(VarError::NotAVariable(id)),
            None if id.is_empty() => Err(VarError::NullNode),
            None => Err(VarError::NodeNotFound(id)),
        }
    }

    /// The stored variable behind this reference, if any.
    pub fn variable(&self) -> Option<&Variable> {
        match self {
            VarRef::Variable(var) | VarRef::Local(var) | VarRef::Global(var) => Some(var),
            VarRef::System(_) | VarRef::Time => None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.variable().is_none()
    }

    pub fn tier(&self) -> ScopeTier {
        self.variable().map_or(ScopeTier::System, |var| var.tier())
    }

    pub fn split_reaction(&self, graph: &Graph) -> SplitReaction {
        self.variable()
            .map_or(SplitReaction::Copy, |var| var.split_reaction(graph))
    }

    pub fn clear_cached_work_data(&self) {
        if let Some(var) = self.variable() {
            var.clear_cached_work_data();
        }
    }

    /// Current value, initializing stored variables on first use.
    pub fn extract_value(&self, ctx: &mut Processor) -> NodeList {
        match self {
            VarRef::Variable(var) | VarRef::Local(var) | VarRef::Global(var) => {
                let binding = ctx.binding_or_init(var);
                let mut result = ctx.runtime().pools().node_ids.get_buffer();
                result.extend_from_slice(&binding.read());
                result
            }
            VarRef::System(var) => ctx.read_system(*var, true),
            VarRef::Time => ctx.current_time_value(),
        }
    }

    /// Pushes the current value onto the context's argument stack.
    pub fn get_value(&self, ctx: &mut Processor) {
        let values = self.extract_value(ctx);
        ctx.push_values(&values);
        ctx.runtime().pools().node_ids.recycle(values);
    }

    /// Peek that never initializes and never consumes a return value.
    pub fn get_value_without_init(&self, ctx: &Processor) -> NodeList {
        match self {
            VarRef::Variable(var) | VarRef::Local(var) | VarRef::Global(var) => ctx
                .binding(var)
                .map(|binding| binding.read().clone())
                .unwrap_or_default(),
            VarRef::System(var) => ctx.peek_system(*var),
            VarRef::Time => NodeList::new(),
        }
    }

    pub fn store_value(&self, ctx: &mut Processor, values: &[NodeId]) {
        match self {
            VarRef::Variable(var) | VarRef::Local(var) | VarRef::Global(var) => ctx.store(var, values),
            VarRef::System(var) => {
                log::error!("Can't store a value in the read-only system variable {}", var.name());
            }
            VarRef::Time => log::error!("Can't store a value in the time variable"),
        }
    }
}

/// Cache of resolved variable wrappers, keyed by node id
#[derive(Debug, Default)]
pub struct VariableTable {
    entries: RwLock<HashMap<NodeId, Arc<VarRef>>>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `id`, caching the result. Non-variable nodes yield `None`.
    pub fn resolve(&self, graph: &Graph, id: NodeId) -> Option<Arc<VarRef>> {
        if let Some(var) = self.entries.read().get(&id) {
            return Some(var.clone());
        }
        let resolved = Arc::new(VarRef::resolve(graph, id).ok()?);
        Some(self.entries.write().entry(id).or_insert(resolved).clone())
    }

    pub fn invalidate(&self, id: NodeId) {
        if let Some(var) = self.entries.read().get(&id) {
            var.clear_cached_work_data();
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::predefined;

    #[test]
    fn test_resolve_dispatches_on_tag() {
        let graph = Graph::new();
        let local = graph.add_node(NodeKind::Variable(VarTag::Local));
        let global = graph.add_node(NodeKind::Variable(VarTag::Global));

        assert!(matches!(VarRef::resolve(&graph, local), Ok(VarRef::Local(_))));
        assert!(matches!(VarRef::resolve(&graph, global), Ok(VarRef::Global(_))));
        assert!(matches!(
            VarRef::resolve(&graph, predefined::CURRENT_INFO),
            Ok(VarRef::System(SystemVar::CurrentInfo))
        ));
        assert!(matches!(VarRef::resolve(&graph, predefined::NOW), Ok(VarRef::Time)));
        assert_eq!(VarRef::resolve(&graph, NodeId::EMPTY).unwrap_err(), VarError::NullNode);
    }

    #[test]
    fn test_system_tag_on_foreign_node_is_rejected() {
        let graph = Graph::new();
        let fake = graph.add_node(NodeKind::Variable(VarTag::System));
        assert_eq!(
            VarRef::resolve(&graph, fake).unwrap_err(),
            VarError::UnknownSystemVariable(fake)
        );
    }

    #[test]
    fn test_table_resolves_once() {
        let graph = Graph::new();
        let table = VariableTable::new();
        let var = graph.add_node(NodeKind::Variable(VarTag::Variable));
        let neuron = graph.add_node(NodeKind::Neuron);

        let first = table.resolve(&graph, var).unwrap();
        let second = table.resolve(&graph, var).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(table.resolve(&graph, neuron).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_invalidate_refreshes_split_reaction() {
        let graph = Graph::new();
        let table = VariableTable::new();
        let var = graph.add_node(NodeKind::Variable(VarTag::Local));
        let resolved = table.resolve(&graph, var).unwrap();
        assert_eq!(resolved.split_reaction(&graph), SplitReaction::Copy);

        graph.add_link(var, predefined::DUPLICATE, predefined::SPLIT_REACTION).unwrap();
        table.invalidate(var);
        assert_eq!(resolved.split_reaction(&graph), SplitReaction::Duplicate);
    }
}
