//! Variable resolution and execution context for a graph rule processor.

pub mod config;
pub mod graph;
pub mod processor;
pub mod runtime;
pub mod storage;
pub mod time;
pub mod vars;

pub use config::{PoolConfig, RuntimeConfig, StorageConfig};
pub use graph::{predefined, Graph, GraphError, NodeId, NodeKind, VarTag};
pub use processor::Processor;
pub use runtime::Runtime;
pub use storage::{FileBackend, Properties, StorageError};
pub use time::{Freezer, TimeCache};
pub use vars::{Scalar, SplitReaction, SystemVar, ValueKind, VarError, VarRef};
