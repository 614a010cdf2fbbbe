use serde::{Deserialize, Serialize};

/// Identity of a node in the graph store. `NodeId::EMPTY` is never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub const EMPTY: NodeId = NodeId(0);

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Which variable behaviour a variable node resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarTag {
    Variable,
    Local,
    Global,
    System,
    Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Neuron,
    Int(i64),
    Double(f64),
    Text(String),
    Cluster { meaning: NodeId, children: Vec<NodeId> },
    Variable(VarTag),
}

/// A directed, meaning-tagged edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
    pub meaning: NodeId,
}

/// A single vertex in the graph store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    links_out: Vec<Link>,
    links_in: Vec<Link>,
    clusters: Vec<NodeId>, // clusters that list this node as a child
    usage: u32,            // pin count, > 0 protects from deletion
    frozen: bool,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            links_out: Vec::new(),
            links_in: Vec::new(),
            clusters: Vec::new(),
            usage: 0,
            frozen: false,
        }
    }

    // Getters
    pub fn id(&self) -> NodeId { self.id }
    pub fn kind(&self) -> &NodeKind { &self.kind }
    pub fn links_out(&self) -> &[Link] { &self.links_out }
    pub fn links_in(&self) -> &[Link] { &self.links_in }
    pub fn clusters(&self) -> &[NodeId] { &self.clusters }
    pub fn usage(&self) -> u32 { self.usage }
    pub fn is_frozen(&self) -> bool { self.frozen }

    pub fn int_value(&self) -> Option<i64> {
        match self.kind {
            NodeKind::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&[NodeId]> {
        match &self.kind {
            NodeKind::Cluster { children, .. } => Some(children),
            _ => None,
        }
    }

    /// True when no link, in or out, and no containing cluster refers to this node.
    pub fn is_unreferenced(&self) -> bool {
        self.links_in.is_empty() && self.links_out.is_empty() && self.clusters.is_empty()
    }

    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub(crate) fn links_out_mut(&mut self) -> &mut Vec<Link> {
        &mut self.links_out
    }

    pub(crate) fn links_in_mut(&mut self) -> &mut Vec<Link> {
        &mut self.links_in
    }

    pub(crate) fn clusters_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.clusters
    }

    pub(crate) fn pin(&mut self) -> u32 {
        self.usage = self.usage.saturating_add(1);
        self.usage
    }

    pub(crate) fn unpin(&mut self) -> u32 {
        self.usage = self.usage.saturating_sub(1);
        self.usage
    }

    pub(crate) fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }
}
