use super::values::ScopeTier;
use super::VarError;
use crate::graph::{predefined, Graph, NodeId, NodeKind, VarTag};
use parking_lot::RwLock;

/// What happens to a call-local binding when its processor splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitReaction {
    #[default]
    Copy,
    Duplicate,
    Empty,
}

impl SplitReaction {
    fn from_marker(marker: Option<NodeId>) -> Self {
        match marker {
            Some(predefined::DUPLICATE) => SplitReaction::Duplicate,
            Some(predefined::EMPTY) => SplitReaction::Empty,
            _ => SplitReaction::Copy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Double,
    Bool,
    None,
}

impl ValueKind {
    fn from_marker(marker: Option<NodeId>) -> Self {
        match marker {
            Some(predefined::INT_TYPE) => ValueKind::Int,
            Some(predefined::DOUBLE_TYPE) => ValueKind::Double,
            Some(predefined::BOOL_TYPE) => ValueKind::Bool,
            _ => ValueKind::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WorkData {
    initial_value: Option<NodeId>,
    split_reaction: SplitReaction,
    value_kind: ValueKind,
}

/// Wrapper around a stored variable node (`Variable`, `Local` or `Global`).
#[derive(Debug)]
pub struct Variable {
    id: NodeId,
    tag: VarTag,
    work: RwLock<Option<WorkData>>,
}

impl Variable {
    pub fn new(graph: &Graph, id: NodeId) -> Result<Self, VarError> {
        if id.is_empty() {
            return Err(VarError::NullNode);
        }
        match graph.kind(id) {
            Some(NodeKind::Variable(tag @ (VarTag::Variable | VarTag::Local | VarTag::Global))) => Ok(Self {
                id,
                tag,
                work: RwLock::new(None),
            }),
            Some(_) => Err(VarError::NotAVariable(id)),
            None => Err(VarError::NodeNotFound(id)),
        }
    }

    pub fn id(&self) -> NodeId { self.id }
    pub fn tag(&self) -> VarTag { self.tag }

    pub fn tier(&self) -> ScopeTier {
        match self.tag {
            VarTag::Global => ScopeTier::Global,
            _ => ScopeTier::CallLocal,
        }
    }

    fn work_data(&self, graph: &Graph) -> WorkData {
        if let Some(data) = *self.work.read() {
            return data;
        }
        let data = WorkData {
            initial_value: graph.find_link_by_meaning(self.id, predefined::INITIAL_VALUE),
            split_reaction: SplitReaction::from_marker(
                graph.find_link_by_meaning(self.id, predefined::SPLIT_REACTION),
            ),
            value_kind: ValueKind::from_marker(graph.find_link_by_meaning(self.id, predefined::TYPE_OF_VALUE)),
        };
        *self.work.write() = Some(data);
        data
    }

    pub fn initial_value(&self, graph: &Graph) -> Option<NodeId> {
        self.work_data(graph).initial_value
    }

    pub fn split_reaction(&self, graph: &Graph) -> SplitReaction {
        self.work_data(graph).split_reaction
    }

    pub fn value_kind(&self, graph: &Graph) -> ValueKind {
        self.work_data(graph).value_kind
    }

    /// Forgets the cached link lookups; called when the node's links change.
    pub fn clear_cached_work_data(&self) {
        *self.work.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(graph: &Graph, tag: VarTag) -> Variable {
        let id = graph.add_node(NodeKind::Variable(tag));
        Variable::new(graph, id).unwrap()
    }

    #[test]
    fn test_construction_rejects_bad_nodes() {
        let graph = Graph::new();
        let neuron = graph.add_node(NodeKind::Neuron);

        assert_eq!(Variable::new(&graph, NodeId::EMPTY).unwrap_err(), VarError::NullNode);
        assert_eq!(Variable::new(&graph, neuron).unwrap_err(), VarError::NotAVariable(neuron));
        assert_eq!(
            Variable::new(&graph, NodeId(4242)).unwrap_err(),
            VarError::NodeNotFound(NodeId(4242))
        );
        assert_eq!(
            Variable::new(&graph, predefined::RETURN_VALUE).unwrap_err(),
            VarError::NotAVariable(predefined::RETURN_VALUE)
        );
    }

    #[test]
    fn test_defaults_without_links() {
        let graph = Graph::new();
        let var = variable(&graph, VarTag::Local);

        assert_eq!(var.split_reaction(&graph), SplitReaction::Copy);
        assert_eq!(var.value_kind(&graph), ValueKind::None);
        assert_eq!(var.initial_value(&graph), None);
        assert_eq!(var.tier(), ScopeTier::CallLocal);
    }

    #[test]
    fn test_cached_work_data_needs_explicit_invalidation() {
        let graph = Graph::new();
        let var = variable(&graph, VarTag::Global);
        assert_eq!(var.split_reaction(&graph), SplitReaction::Copy);

        graph.add_link(var.id(), predefined::EMPTY, predefined::SPLIT_REACTION).unwrap();
        graph.add_link(var.id(), predefined::INT_TYPE, predefined::TYPE_OF_VALUE).unwrap();
        assert_eq!(var.split_reaction(&graph), SplitReaction::Copy);

        var.clear_cached_work_data();
        assert_eq!(var.split_reaction(&graph), SplitReaction::Empty);
        assert_eq!(var.value_kind(&graph), ValueKind::Int);
        assert_eq!(var.tier(), ScopeTier::Global);
    }
}
