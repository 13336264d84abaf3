use std::path::Path;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::SeederError;
use crate::constants::{MAX_CHUNK_HASHES_LEN, MAX_FILE_NAME_LEN};

/// An ingested file: its chunks in index order plus one SHA-256 digest per
/// chunk, computed eagerly at ingest time.
///
/// Chunks are slices of one shared immutable buffer, so handing a chunk to
/// a connection is a reference-count bump, not a copy, and no lock guards
/// the serve path. Concatenating the chunks in index order reproduces the
/// file byte for byte.
#[derive(Debug)]
pub struct ChunkStore {
    file_name: String,
    total_len: u64,
    chunks: Vec<Bytes>,
    digests: Vec<[u8; 32]>,
}

impl ChunkStore {
    /// Reads a file and splits it into `chunk_size` chunks. The last chunk
    /// may be shorter but never empty; empty files are refused.
    pub async fn ingest(path: &Path, chunk_size: usize) -> Result<Self, SeederError> {
        let file_name = file_name_of(path)?;
        let data = Bytes::from(tokio::fs::read(path).await?);
        if data.is_empty() {
            return Err(SeederError::EmptyFile(file_name));
        }

        let total_len = data.len() as u64;
        let chunk_count = data.len().div_ceil(chunk_size);
        // Every chunk digest must fit in one ChunkHashes reply, or no
        // leecher could ever verify a download of this file.
        if chunk_count > MAX_CHUNK_HASHES_LEN {
            return Err(SeederError::TooManyChunks {
                file: file_name,
                chunks: chunk_count,
            });
        }
        let mut chunks = Vec::with_capacity(chunk_count);
        let mut digests = Vec::with_capacity(chunk_count);
        let mut start = 0;
        while start < data.len() {
            let end = (start + chunk_size).min(data.len());
            let chunk = data.slice(start..end);
            digests.push(Sha256::digest(&chunk).into());
            chunks.push(chunk);
            start = end;
        }

        debug!(file = %file_name, total_len, chunks = chunks.len(), "ingested file");
        Ok(Self {
            file_name,
            total_len,
            chunks,
            digests,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    /// The chunk at `index`, if in range. Cheap clone of shared bytes.
    pub fn chunk(&self, index: u32) -> Option<Bytes> {
        self.chunks.get(index as usize).cloned()
    }

    /// The digest of the chunk at `index`, if in range.
    pub fn digest(&self, index: u32) -> Option<[u8; 32]> {
        self.digests.get(index as usize).copied()
    }

    /// All per-chunk digests in index order.
    pub fn digests(&self) -> &[[u8; 32]] {
        &self.digests
    }
}

/// Extracts the wire-safe final path component of the hosted file.
fn file_name_of(path: &Path) -> Result<String, SeederError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SeederError::BadFileName(path.display().to_string()))?;
    if name.is_empty() || name.len() > MAX_FILE_NAME_LEN {
        return Err(SeederError::BadFileName(name.to_string()));
    }
    Ok(name.to_string())
}
