//! Typed property persistence used to keep calendar tables across runs.

pub mod compression;
pub mod file;

pub use compression::{CompressionAlgorithm, Compressor};
pub use file::FileBackend;

use bincode::{deserialize, serialize};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Invalid checksum for property {0}")]
    ChecksumMismatch(String),
    #[error("Redundancy check failed: {0}")]
    RedundancyError(String),
}

/// Raw byte storage addressed by `(owner, key)`.
pub trait PropertyBackend: Send + Sync {
    fn load(&self, owner: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn store(&self, owner: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

#[derive(Default)]
pub struct MemoryBackend {
    values: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyBackend for MemoryBackend {
    fn load(&self, owner: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.values.read().get(&(owner.to_string(), key.to_string())).cloned())
    }

    fn store(&self, owner: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.values
            .write()
            .insert((owner.to_string(), key.to_string()), data.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.values.write().clear();
        Ok(())
    }
}

/// Typed front end over a [`PropertyBackend`]; values are bincode encoded.
#[derive(Clone)]
pub struct Properties {
    backend: Arc<dyn PropertyBackend>,
    writes: Arc<std::sync::atomic::AtomicUsize>,
}

impl Properties {
    pub fn new(backend: Arc<dyn PropertyBackend>) -> Self {
        Self {
            backend,
            writes: Arc::default(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn get_property<T: DeserializeOwned>(&self, owner: &str, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.load(owner, key)? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn save_property<T: Serialize>(&self, owner: &str, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serialize(value)?;
        self.backend.store(owner, key, &bytes)?;
        self.writes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Number of successful `save_property` calls through this handle and its clones.
    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.backend.clear()
    }
}
