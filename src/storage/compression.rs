use super::StorageError;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    None,
    LZ4,
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        CompressionAlgorithm::LZ4
    }
}

/// Size accounting for one compressed payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompressionMetrics {
    pub original_size: usize,
    pub compressed_size: usize,
    pub algorithm: CompressionAlgorithm,
}

impl CompressionMetrics {
    pub fn compression_ratio(&self) -> f32 {
        if self.original_size == 0 {
            return 1.0;
        }
        self.compressed_size as f32 / self.original_size as f32
    }
}

pub struct Compressor {
    algorithm: CompressionAlgorithm,
}

impl Compressor {
    pub fn new(algorithm: CompressionAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    pub fn compress(&self, data: &[u8]) -> (Vec<u8>, CompressionMetrics) {
        let compressed = match self.algorithm {
            CompressionAlgorithm::None => data.to_vec(),
            CompressionAlgorithm::LZ4 => compress_prepend_size(data),
        };

        let metrics = CompressionMetrics {
            original_size: data.len(),
            compressed_size: compressed.len(),
            algorithm: self.algorithm,
        };
        (compressed, metrics)
    }

    /// Decompresses with the algorithm the payload was written with.
    pub fn decompress(algorithm: CompressionAlgorithm, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        match algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::LZ4 => decompress_size_prepended(data)
                .map_err(|e| StorageError::Decompression(e.to_string())),
        }
    }
}
