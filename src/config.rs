use crate::storage::CompressionAlgorithm;
use std::path::PathBuf;

/// Configuration for the node-list buffer pools
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of idle buffers kept per pool
    pub max_idle_buffers: usize,
    /// Capacity reserved for freshly allocated buffers
    pub initial_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_buffers: 256,
            initial_capacity: 8,
        }
    }
}

/// Configuration for the file property backend
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub storage_path: PathBuf,
    pub backup_path: PathBuf,
    pub compression: CompressionAlgorithm,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("storage/properties"),
            backup_path: PathBuf::from("storage/properties_backup"),
            compression: CompressionAlgorithm::LZ4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub pool: PoolConfig,
    /// Property owner under which the calendar tables are persisted
    pub time_owner: String,
    /// Flush dirty calendar tables when the runtime is dropped
    pub flush_on_drop: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            time_owner: String::from("TimeCache"),
            flush_on_drop: true,
        }
    }
}
