use thiserror::Error;

use crate::seeder::SeederError;
use crate::tracker::TrackerError;

/// Errors that end a download.
///
/// Transient transport failures (connect errors, timeouts, short reads,
/// refused requests, digest mismatches) are absorbed by the retry loop and
/// only surface here once a chunk's retry budget is spent.
#[derive(Debug, Error)]
pub enum LeecherError {
    /// The requested name cannot be a plain file inside the download
    /// directory.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    /// Discovery or sizing against the tracker failed.
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// The tracker knows no live seeder for the file.
    #[error("no seeders available for {0}")]
    NoSeeders(String),

    /// No seeder could supply the expected chunk digests, so nothing can
    /// be verified.
    #[error("no seeder could provide chunk digests for {0}")]
    HashesUnavailable(String),

    /// One chunk exhausted its retry budget.
    #[error("chunk {index} failed after {attempts} attempts")]
    FailedChunk { index: u32, attempts: u32 },

    /// The reassembled file does not match the expected whole-file digest.
    #[error("file digest mismatch for {0}")]
    FailedFile(String),

    /// Filesystem error while reassembling.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The download finished but this peer could not start seeding the
    /// file.
    #[error("promotion to seeder failed: {0}")]
    Promotion(#[source] SeederError),

    /// The caller cancelled the download. Not a failure.
    #[error("download cancelled")]
    Cancelled,
}

impl LeecherError {
    /// Process exit code for thin CLI frontends.
    pub fn exit_code(&self) -> i32 {
        match self {
            LeecherError::InvalidFileName(_) => 2,
            LeecherError::Tracker(_) => 3,
            LeecherError::NoSeeders(_) | LeecherError::HashesUnavailable(_) => 4,
            LeecherError::FailedChunk { .. } | LeecherError::FailedFile(_) => 5,
            LeecherError::Cancelled => 130,
            LeecherError::Io(_) | LeecherError::Promotion(_) => 1,
        }
    }
}
