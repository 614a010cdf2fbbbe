use super::node::{Link, Node, NodeId, NodeKind, VarTag};
use super::{predefined, GraphError};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Part of a node a caller wants exclusive access to. Every level currently
/// maps to the same per-node lock; the level is kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockLevel {
    All,
    LinksIn,
    LinksOut,
    Parents,
    Value,
}

/// Thread-safe in-memory graph of nodes, links and clusters
pub struct Graph {
    nodes: RwLock<HashMap<NodeId, Node>>,
    next_id: AtomicU64,
    locked: Mutex<HashSet<NodeId>>,
    released: Condvar,
}

/// Exclusive hold on one node, released on drop.
pub struct NodeLock<'a> {
    graph: &'a Graph,
    id: NodeId,
    level: LockLevel,
}

impl NodeLock<'_> {
    pub fn id(&self) -> NodeId { self.id }
    pub fn level(&self) -> LockLevel { self.level }
}

impl Drop for NodeLock<'_> {
    fn drop(&mut self) {
        self.graph.release_lock(self.id);
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Self::predefined_nodes()),
            next_id: AtomicU64::new(predefined::FIRST_FREE_ID),
            locked: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    fn predefined_nodes() -> HashMap<NodeId, Node> {
        use predefined::*;

        let neurons = [
            INITIAL_VALUE, SPLIT_REACTION, COPY, DUPLICATE, EMPTY, TYPE_OF_VALUE,
            INT_TYPE, DOUBLE_TYPE, BOOL_TYPE, TIME, TIME_SPAN, TRUE, FALSE,
        ];
        let system = [
            CURRENT_FROM, CURRENT_TO, CURRENT_MEANING, CURRENT_SIN, CURRENT_INFO, RETURN_VALUE,
        ];

        let mut nodes = HashMap::new();
        let kinds = neurons
            .iter()
            .map(|&id| (id, NodeKind::Neuron))
            .chain(system.iter().map(|&id| (id, NodeKind::Variable(VarTag::System))))
            .chain(std::iter::once((NOW, NodeKind::Variable(VarTag::Time))));
        for (id, kind) in kinds {
            let mut node = Node::new(id, kind);
            node.pin();
            nodes.insert(id, node);
        }
        nodes
    }

    /// Adds a new node and returns its id
    pub fn add_node(&self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.nodes.write().insert(id, Node::new(id, kind));
        id
    }

    pub fn create_constant_int(&self, value: i64) -> NodeId {
        self.add_node(NodeKind::Int(value))
    }

    /// Creates a cluster and registers it as parent of every child.
    pub fn create_cluster(&self, meaning: NodeId, children: &[NodeId]) -> Result<NodeId, GraphError> {
        let mut nodes = self.nodes.write();
        if let Some(missing) = children.iter().find(|c| !nodes.contains_key(*c)) {
            return Err(GraphError::NodeNotFound(*missing));
        }

        let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        for child in children {
            if let Some(node) = nodes.get_mut(child) {
                node.clusters_mut().push(id);
            }
        }
        let kind = NodeKind::Cluster { meaning, children: children.to_vec() };
        nodes.insert(id, Node::new(id, kind));
        Ok(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().contains_key(&id)
    }

    /// Snapshot of a node
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.nodes.read().get(&id).cloned()
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.read().get(&id).map(|n| n.kind().clone())
    }

    pub fn int_value(&self, id: NodeId) -> Option<i64> {
        self.nodes.read().get(&id).and_then(|n| n.int_value())
    }

    pub fn double_value(&self, id: NodeId) -> Option<f64> {
        match self.nodes.read().get(&id).map(|n| n.kind()) {
            Some(NodeKind::Double(v)) => Some(*v),
            Some(NodeKind::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    /// Meaning and children of a cluster node.
    pub fn cluster(&self, id: NodeId) -> Option<(NodeId, Vec<NodeId>)> {
        match self.nodes.read().get(&id).map(|n| n.kind()) {
            Some(NodeKind::Cluster { meaning, children }) => Some((*meaning, children.clone())),
            _ => None,
        }
    }

    pub fn usage(&self, id: NodeId) -> Option<u32> {
        self.nodes.read().get(&id).map(|n| n.usage())
    }

    pub fn is_frozen(&self, id: NodeId) -> bool {
        self.nodes.read().get(&id).map_or(false, |n| n.is_frozen())
    }

    pub fn links_out(&self, id: NodeId) -> Vec<Link> {
        self.nodes.read().get(&id).map(|n| n.links_out().to_vec()).unwrap_or_default()
    }

    pub fn links_in(&self, id: NodeId) -> Vec<Link> {
        self.nodes.read().get(&id).map(|n| n.links_in().to_vec()).unwrap_or_default()
    }

    pub fn clusters_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes.read().get(&id).map(|n| n.clusters().to_vec()).unwrap_or_default()
    }

    pub fn is_unreferenced(&self, id: NodeId) -> bool {
        self.nodes.read().get(&id).map_or(false, |n| n.is_unreferenced())
    }

    /// Adds a link. Adding an existing link is a no-op.
    ///
    /// Links leaving a variable node should go through `Runtime::add_link`,
    /// which also drops the variable's cached lookups.
    pub fn add_link(&self, from: NodeId, to: NodeId, meaning: NodeId) -> Result<(), GraphError> {
        let mut nodes = self.nodes.write();
        for id in [from, to, meaning] {
            if !nodes.contains_key(&id) {
                return Err(GraphError::NodeNotFound(id));
            }
        }

        let link = Link { from, to, meaning };
        if let Some(node) = nodes.get_mut(&from) {
            if node.links_out().contains(&link) {
                return Ok(());
            }
            node.links_out_mut().push(link);
        }
        if let Some(node) = nodes.get_mut(&to) {
            node.links_in_mut().push(link);
        }
        Ok(())
    }

    /// Removes a link; use `Runtime::remove_link` for variable nodes.
    pub fn remove_link(&self, from: NodeId, to: NodeId, meaning: NodeId) -> bool {
        let mut nodes = self.nodes.write();
        let link = Link { from, to, meaning };
        let removed = nodes.get_mut(&from).map_or(false, |n| {
            let before = n.links_out().len();
            n.links_out_mut().retain(|l| *l != link);
            before != n.links_out().len()
        });
        if removed {
            if let Some(node) = nodes.get_mut(&to) {
                node.links_in_mut().retain(|l| *l != link);
            }
        }
        removed
    }

    /// Target of the first outgoing link of `id` with the given meaning.
    pub fn find_link_by_meaning(&self, id: NodeId, meaning: NodeId) -> Option<NodeId> {
        let nodes = self.nodes.read();
        nodes
            .get(&id)?
            .links_out()
            .iter()
            .find(|l| l.meaning == meaning)
            .map(|l| l.to)
    }

    /// Increments the usage count, returning the new value.
    pub fn pin(&self, id: NodeId) -> Option<u32> {
        self.nodes.write().get_mut(&id).map(|n| n.pin())
    }

    pub fn unpin(&self, id: NodeId) -> Option<u32> {
        self.nodes.write().get_mut(&id).map(|n| n.unpin())
    }

    pub fn set_frozen(&self, id: NodeId, frozen: bool) -> bool {
        match self.nodes.write().get_mut(&id) {
            Some(node) => {
                node.set_frozen(frozen);
                true
            }
            None => false,
        }
    }

    /// Deletes a node together with every link and cluster membership that
    /// refers to it. Pinned and predefined nodes are never deleted.
    pub fn delete_node(&self, id: NodeId) -> bool {
        if predefined::is_predefined(id) {
            return false;
        }
        let mut nodes = self.nodes.write();
        match nodes.get(&id) {
            Some(node) if node.usage() == 0 => {}
            _ => return false,
        }
        let node = match nodes.remove(&id) {
            Some(node) => node,
            None => return false,
        };

        for link in node.links_out() {
            if let Some(to) = nodes.get_mut(&link.to) {
                to.links_in_mut().retain(|l| l != link);
            }
        }
        for link in node.links_in() {
            if let Some(from) = nodes.get_mut(&link.from) {
                from.links_out_mut().retain(|l| l != link);
            }
        }
        for parent in node.clusters() {
            if let Some(NodeKind::Cluster { children, .. }) = nodes.get_mut(parent).map(|p| p.kind_mut()) {
                children.retain(|c| *c != id);
            }
        }
        if let Some(children) = node.children() {
            for child in children {
                if let Some(child) = nodes.get_mut(child) {
                    if let Some(pos) = child.clusters().iter().position(|c| *c == id) {
                        child.clusters_mut().remove(pos);
                    }
                }
            }
        }
        true
    }

    /// Creates an unpinned copy of a node: same kind, same children, same
    /// outgoing links.
    pub fn duplicate(&self, id: NodeId) -> Option<NodeId> {
        let mut nodes = self.nodes.write();
        let source = nodes.get(&id)?.clone();
        let new_id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));

        if let Some(children) = source.children() {
            for child in children {
                if let Some(child) = nodes.get_mut(child) {
                    child.clusters_mut().push(new_id);
                }
            }
        }

        let mut copy = Node::new(new_id, source.kind().clone());
        for link in source.links_out() {
            let link = Link { from: new_id, ..*link };
            copy.links_out_mut().push(link);
            if let Some(to) = nodes.get_mut(&link.to) {
                to.links_in_mut().push(link);
            }
        }
        nodes.insert(new_id, copy);
        Some(new_id)
    }

    /// Blocks until exclusive access to `id` is granted.
    pub fn request_lock(&self, id: NodeId, level: LockLevel) -> NodeLock<'_> {
        let mut locked = self.locked.lock();
        while locked.contains(&id) {
            self.released.wait(&mut locked);
        }
        locked.insert(id);
        NodeLock { graph: self, id, level }
    }

    fn release_lock(&self, id: NodeId) {
        self.locked.lock().remove(&id);
        self.released.notify_all();
    }

    /// Drops every node except the predefined ones.
    /// Drops every non-predefined node. Ids keep counting up, so an id held
    /// from before the clear never names a new node.
    pub fn clear(&self) {
        *self.nodes.write() = Self::predefined_nodes();
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
