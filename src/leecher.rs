//! Leecher: parallel multi-source download with per-chunk verification.
//!
//! A download discovers seeders through the tracker, fetches the file's
//! chunk count and expected digest vector, then pulls chunks in parallel
//! from the seeder set: a shared queue of chunk indices feeds a bounded
//! worker pool, every received chunk is verified against its expected
//! SHA-256 digest before it may enter the result buffer, and failed
//! attempts are re-queued against alternate seeders under a per-chunk
//! retry budget. Completed chunks are reassembled into a `.part` file and
//! atomically renamed into place.
//!
//! Chunks may complete in any order; the result buffer is write-once per
//! slot and progress is a monotonically non-decreasing completed count.
//! Cancellation is observed at every suspension point and is reported as
//! [`LeecherError::Cancelled`], distinct from failure.

mod download;
mod error;
mod scheduler;

pub use download::{download, DownloadRequest, Downloaded, Progress};
pub use error::LeecherError;
