//! Protocol constants and tuning parameters.
//!
//! Central home for the wire-format limits, default ports, timeouts and
//! concurrency caps used across the tracker, seeder and leecher roles.

use std::time::Duration;

// ============================================================================
// Ports
// ============================================================================

/// Default tracker UDP port.
pub const DEFAULT_TRACKER_PORT: u16 = 5000;

// ============================================================================
// Chunk and frame sizes
// ============================================================================

/// Default chunk size (512 KiB). The last chunk of a file may be shorter,
/// but never empty.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Maximum payload carried by a single ChunkData message (1 MiB).
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Header allowance on top of the body cap when sizing a stream frame.
pub const MAX_HEADER_SIZE: usize = 1024;

/// Maximum length of one stream frame, excluding the 4-byte length prefix.
pub const MAX_FRAME_SIZE: usize = MAX_BODY_SIZE + MAX_HEADER_SIZE;

/// Maximum encoded datagram accepted from or sent to the tracker (64 KiB).
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Maximum length of a file name on the wire.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Maximum length of an error-text field on the wire.
pub const MAX_ERROR_TEXT_LEN: usize = 1024;

/// Maximum number of peers in a single PeerList reply.
pub const MAX_PEER_LIST_LEN: usize = 1024;

/// Maximum number of digests in a single ChunkHashes reply. Ingest
/// refuses files that split into more chunks than this; together with
/// [`DEFAULT_CHUNK_SIZE`] that bounds hosted files at 16 GiB.
pub const MAX_CHUNK_HASHES_LEN: usize = 32 * 1024;

// ============================================================================
// Timeouts and intervals
// ============================================================================

/// A seeder silent for longer than this is reaped from the registry.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(90);

/// How often the tracker's reaper scans for expired seeders.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

/// How often a seeder beacons a keepalive to the tracker. Three missed
/// beacons exhaust [`DEFAULT_LIVENESS_TIMEOUT`].
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Per-connection budget for the seeder to read a request and write the
/// reply.
pub const DEFAULT_SERVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-attempt budget for the leecher to connect, request and receive one
/// chunk.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a tracker client waits for a datagram reply.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Concurrency caps
// ============================================================================

/// Default number of parallel download workers.
pub const DEFAULT_PARALLELISM: usize = 8;

/// Hard cap on download workers regardless of configuration.
pub const MAX_PARALLELISM: usize = 64;

/// Maximum chunk serves a seeder runs concurrently; excess connections
/// wait for a slot.
pub const DEFAULT_MAX_INFLIGHT_SERVES: usize = 64;

/// How many times one chunk index may be reattempted before the download
/// aborts.
pub const DEFAULT_RETRY_BUDGET: u32 = 5;
