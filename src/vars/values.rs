use crate::graph::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub type NodeList = Vec<NodeId>;

/// The list bound to one variable within one scope. The `Arc` identity stays
/// stable for the life of the scope; stores only replace the contents.
pub type Binding = Arc<RwLock<NodeList>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTier {
    CallLocal,
    Global,
    System,
}

/// Variable id -> binding map for one scope
#[derive(Debug, Default)]
pub struct VarScope {
    values: HashMap<NodeId, Binding>,
}

impl VarScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, variable: NodeId) -> Option<Binding> {
        self.values.get(&variable).cloned()
    }

    /// Inserts `initial` unless a binding already exists; either way returns
    /// the binding that ends up in the scope.
    pub fn get_or_insert(&mut self, variable: NodeId, initial: NodeList) -> Binding {
        self.values
            .entry(variable)
            .or_insert_with(|| Arc::new(RwLock::new(initial)))
            .clone()
    }

    /// Replaces the contents of the binding, creating it when missing.
    pub fn store(&mut self, variable: NodeId, values: &[NodeId]) -> Binding {
        let binding = self.get_or_insert(variable, NodeList::new());
        {
            let mut list = binding.write();
            list.clear();
            list.extend_from_slice(values);
        }
        binding
    }

    pub fn remove(&mut self, variable: NodeId) -> Option<Binding> {
        self.values.remove(&variable)
    }

    pub fn insert(&mut self, variable: NodeId, binding: Binding) {
        self.values.insert(variable, binding);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Binding)> {
        self.values.iter()
    }

    /// Empties the scope, handing each list back for recycling when this scope
    /// was its only owner.
    pub fn drain_lists(&mut self) -> impl Iterator<Item = NodeList> + '_ {
        self.values
            .drain()
            .filter_map(|(_, binding)| Arc::try_unwrap(binding).ok().map(RwLock::into_inner))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
