use thiserror::Error;

use crate::constants::MAX_CHUNK_HASHES_LEN;
use crate::tracker::TrackerError;

/// Errors raised while ingesting or serving files. Codec failures while
/// answering a request are absorbed on the connection that caused them.
#[derive(Debug, Error)]
pub enum SeederError {
    /// Filesystem or socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Registration or keepalive against the tracker failed.
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// The file to host is empty; there is no chunk to serve.
    #[error("refusing to host empty file: {0}")]
    EmptyFile(String),

    /// The file splits into more chunks than a ChunkHashes reply can
    /// carry, so leechers could never verify it.
    #[error("refusing to host {file}: {chunks} chunks exceeds the {MAX_CHUNK_HASHES_LEN} limit")]
    TooManyChunks { file: String, chunks: usize },

    /// The file name cannot be carried on the wire.
    #[error("unusable file name: {0}")]
    BadFileName(String),

    /// `run` was called while the serve loop was already running.
    #[error("seeder is already running")]
    AlreadyRunning,
}
