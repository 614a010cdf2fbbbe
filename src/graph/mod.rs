//! In-memory node/graph store consumed by the variable runtime.

pub mod node;
pub mod store;

pub use node::{Link, Node, NodeId, NodeKind, VarTag};
pub use store::{Graph, LockLevel, NodeLock};

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),
    #[error("Node {0:?} is not a cluster")]
    NotACluster(NodeId),
}

/// Reserved nodes created with every graph and kept across `Graph::clear`.
pub mod predefined {
    use super::NodeId;

    pub const INITIAL_VALUE: NodeId = NodeId(1);
    pub const SPLIT_REACTION: NodeId = NodeId(2);
    pub const COPY: NodeId = NodeId(3);
    pub const DUPLICATE: NodeId = NodeId(4);
    pub const EMPTY: NodeId = NodeId(5);
    pub const TYPE_OF_VALUE: NodeId = NodeId(6);
    pub const INT_TYPE: NodeId = NodeId(7);
    pub const DOUBLE_TYPE: NodeId = NodeId(8);
    pub const BOOL_TYPE: NodeId = NodeId(9);
    pub const TIME: NodeId = NodeId(10);
    pub const TIME_SPAN: NodeId = NodeId(11);
    pub const TRUE: NodeId = NodeId(12);
    pub const FALSE: NodeId = NodeId(13);

    pub const CURRENT_FROM: NodeId = NodeId(20);
    pub const CURRENT_TO: NodeId = NodeId(21);
    pub const CURRENT_MEANING: NodeId = NodeId(22);
    pub const CURRENT_SIN: NodeId = NodeId(23);
    pub const CURRENT_INFO: NodeId = NodeId(24);
    pub const RETURN_VALUE: NodeId = NodeId(25);
    pub const NOW: NodeId = NodeId(26);

    pub const FIRST_FREE_ID: u64 = 100;

    pub fn is_predefined(id: NodeId) -> bool {
        id.0 > 0 && id.0 < FIRST_FREE_ID
    }
}
