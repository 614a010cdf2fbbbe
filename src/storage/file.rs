use super::compression::{CompressionMetrics, Compressor};
use super::{PropertyBackend, StorageError};
use crate::config::StorageConfig;
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// One persisted property, checksummed over its stored payload
#[derive(Serialize, Deserialize)]
struct PropertyBlock {
    metrics: CompressionMetrics,
    payload: Vec<u8>,
    checksum: u32,
}

impl PropertyBlock {
    fn new(payload: Vec<u8>, metrics: CompressionMetrics) -> Self {
        let checksum = crc32fast::hash(&payload);
        Self {
            metrics,
            payload,
            checksum,
        }
    }

    fn verify(&self) -> bool {
        self.checksum == crc32fast::hash(&self.payload)
    }
}

/// File backed property store with a redundant backup copy of every file.
pub struct FileBackend {
    config: StorageConfig,
    compressor: Compressor,
}

impl FileBackend {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.storage_path)?;
        fs::create_dir_all(&config.backup_path)?;

        Ok(Self {
            compressor: Compressor::new(config.compression),
            config,
        })
    }

    fn file_name(owner: &str, key: &str) -> String {
        let clean = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect()
        };
        format!("{}.{}.prop", clean(owner), clean(key))
    }

    fn primary_path(&self, owner: &str, key: &str) -> PathBuf {
        self.config.storage_path.join(Self::file_name(owner, key))
    }

    fn backup_path(&self, owner: &str, key: &str) -> PathBuf {
        self.config.backup_path.join(Self::file_name(owner, key))
    }

    fn read_block(path: &Path) -> Result<PropertyBlock, StorageError> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(deserialize(&buffer)?)
    }

    fn write_file(path: &Path, encoded: &[u8]) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(encoded)?;
        file.flush()?;
        Ok(())
    }

    fn unpack(block: &PropertyBlock) -> Result<Vec<u8>, StorageError> {
        Compressor::decompress(block.metrics.algorithm, &block.payload)
    }

    fn clear_dir(dir: &Path) -> Result<(), StorageError> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "prop") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

impl PropertyBackend for FileBackend {
    fn load(&self, owner: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let primary = self.primary_path(owner, key);
        let backup = self.backup_path(owner, key);
        if !primary.exists() && !backup.exists() {
            return Ok(None);
        }

        // Try primary first
        match Self::read_block(&primary) {
            Ok(block) if block.verify() => Ok(Some(Self::unpack(&block)?)),
            _ => match Self::read_block(&backup) {
                Ok(block) if block.verify() => {
                    log::warn!("property {}.{} restored from backup", owner, key);
                    Self::write_file(&primary, &serialize(&block)?)?;
                    Ok(Some(Self::unpack(&block)?))
                }
                _ => Err(StorageError::RedundancyError(format!(
                    "Both primary and backup copies corrupted for {}.{}",
                    owner, key
                ))),
            },
        }
    }

    fn store(&self, owner: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let (payload, metrics) = self.compressor.compress(data);
        let encoded = serialize(&PropertyBlock::new(payload, metrics))?;

        Self::write_file(&self.primary_path(owner, key), &encoded)?;
        Self::write_file(&self.backup_path(owner, key), &encoded)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        Self::clear_dir(&self.config.storage_path)?;
        Self::clear_dir(&self.config.backup_path)
    }
}
