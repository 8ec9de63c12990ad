//! Binary storage for the vector index.
//!
//! File format: index.bin
//!
//! Header (51 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - payload_checksum: u32 (CRC32 of the payload)
//! - header_checksum: u32 (CRC32 of the 47 bytes before it)
//!
//! Payload:
//! - entry_count * dimensions f32 values (little-endian), in position order

use std::path::PathBuf;

use crate::semantic::index::VectorIndex;
use crate::storage::write_atomic;

const FORMAT_VERSION: u8 = 1;

const HEADER_SIZE: usize = 51;
const HEADER_CHECKSUM_AT: usize = 47;

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid index file: {0}")]
    InvalidFormat(String),

    #[error("Index file format {found} is newer than supported format {supported}")]
    VersionMismatch { found: u8, supported: u8 },

    #[error("Index file was written by a different embedding model")]
    ModelMismatch,

    #[error("Index file checksum mismatch")]
    ChecksumMismatch,

    #[error("Index file has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug)]
struct Header {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
    payload_checksum: u32,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = FORMAT_VERSION;
        bytes[1..33].copy_from_slice(&self.model_id);
        bytes[33..35].copy_from_slice(&self.dimensions.to_le_bytes());
        bytes[35..43].copy_from_slice(&self.entry_count.to_le_bytes());
        bytes[43..47].copy_from_slice(&self.payload_checksum.to_le_bytes());

        let checksum = crc32fast::hash(&bytes[..HEADER_CHECKSUM_AT]);
        bytes[HEADER_CHECKSUM_AT..].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self, VectorStorageError> {
        if bytes.len() < HEADER_SIZE {
            return Err(VectorStorageError::InvalidFormat(format!(
                "{} bytes is shorter than the header",
                bytes.len()
            )));
        }

        if bytes[0] > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch {
                found: bytes[0],
                supported: FORMAT_VERSION,
            });
        }

        let stored = u32::from_le_bytes(le(&bytes[HEADER_CHECKSUM_AT..HEADER_SIZE]));
        if stored != crc32fast::hash(&bytes[..HEADER_CHECKSUM_AT]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        Ok(Self {
            model_id: le(&bytes[1..33]),
            dimensions: u16::from_le_bytes(le(&bytes[33..35])),
            entry_count: u64::from_le_bytes(le(&bytes[35..43])),
            payload_checksum: u32::from_le_bytes(le(&bytes[43..47])),
        })
    }
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Serialize an index into the `index.bin` layout.
pub fn encode(index: &VectorIndex, model_id: &[u8; 32]) -> Result<Vec<u8>, VectorStorageError> {
    let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!(
            "dimension {} does not fit in u16",
            index.dimensions()
        ))
    })?;

    let payload: Vec<u8> = index
        .as_slice()
        .iter()
        .flat_map(|value| value.to_le_bytes())
        .collect();

    let header = Header {
        model_id: *model_id,
        dimensions,
        entry_count: index.len() as u64,
        payload_checksum: crc32fast::hash(&payload),
    };

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&header.encode());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Parse `index.bin` bytes, checking model, dimension and both checksums.
pub fn decode(
    bytes: &[u8],
    model_id: &[u8; 32],
    dimensions: usize,
) -> Result<VectorIndex, VectorStorageError> {
    let header = Header::decode(bytes)?;

    if header.model_id != *model_id {
        return Err(VectorStorageError::ModelMismatch);
    }
    if header.dimensions as usize != dimensions {
        return Err(VectorStorageError::DimensionMismatch {
            expected: dimensions,
            got: header.dimensions as usize,
        });
    }

    let payload_len = usize::try_from(header.entry_count)
        .ok()
        .and_then(|count| count.checked_mul(dimensions))
        .and_then(|values| values.checked_mul(4))
        .ok_or_else(|| VectorStorageError::InvalidFormat("entry count overflow".to_string()))?;

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != payload_len {
        return Err(VectorStorageError::InvalidFormat(format!(
            "expected {payload_len} payload bytes, found {}",
            payload.len()
        )));
    }
    if crc32fast::hash(payload) != header.payload_checksum {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let data = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(le(chunk)))
        .collect();

    VectorIndex::from_raw(dimensions, data)
        .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))
}

/// One `index.bin` file on disk.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(
        &self,
        model_id: &[u8; 32],
        dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let bytes = std::fs::read(&self.path)?;
        decode(&bytes, model_id, dimensions)
    }

    /// Replace the file atomically, creating its directory if needed.
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let bytes = encode(index, model_id)?;
        write_atomic(&self.path, &bytes)?;
        log::debug!(
            "wrote {} vectors ({} bytes) to {}",
            index.len(),
            bytes.len(),
            self.path.display()
        );
        Ok(())
    }
}
