use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::LeecherError;
use super::scheduler::{ChunkScheduler, Requeue};
use crate::config::Config;
use crate::constants::MAX_FILE_NAME_LEN;
use crate::protocol::{FrameTransport, Message, PeerEndpoint, ProtocolError};
use crate::shutdown::Shutdown;
use crate::tracker::{TrackerClient, TrackerError};

/// What to download and, optionally, the whole-file digest to verify the
/// reassembled output against.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub file_name: String,
    pub expected_file_digest: Option<[u8; 32]>,
}

impl DownloadRequest {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            expected_file_digest: None,
        }
    }
}

/// A finished download.
#[derive(Debug, Clone)]
pub struct Downloaded {
    /// Final path inside the download directory.
    pub path: PathBuf,
    pub chunk_count: u32,
    pub total_len: u64,
}

/// Snapshot of download progress. `completed` never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
}

/// Everything a download worker needs, shared across the pool.
#[derive(Clone)]
struct WorkerContext {
    config: Arc<Config>,
    file_name: String,
    scheduler: Arc<ChunkScheduler>,
    peers: Arc<RwLock<Vec<PeerEndpoint>>>,
    digests: Arc<Vec<[u8; 32]>>,
    peers_refreshed: Arc<AtomicBool>,
    shutdown: Shutdown,
    progress: Option<Arc<watch::Sender<Progress>>>,
}

/// Why one fetch attempt failed. Absorbed by the retry loop; never
/// reaches the caller directly.
#[derive(Debug, Error)]
enum AttemptError {
    #[error("transport: {0}")]
    Transport(#[from] ProtocolError),

    #[error("seeder refused: {0}")]
    Refused(String),

    #[error("seeder sent chunk {got} instead")]
    WrongIndex { got: u32 },

    #[error("digest mismatch")]
    DigestMismatch,

    #[error("unexpected reply")]
    UnexpectedReply,
}

/// Downloads `request.file_name` from the swarm into the download
/// directory.
///
/// Discovery, sizing, digest fetch, the parallel chunk pull and the
/// atomic reassembly all happen here; promotion to the seeder role is the
/// caller's concern (see [`Peer`](crate::peer::Peer)). Progress snapshots
/// are published through `progress` if supplied.
pub async fn download(
    config: Arc<Config>,
    request: DownloadRequest,
    shutdown: Shutdown,
    progress: Option<Arc<watch::Sender<Progress>>>,
) -> Result<Downloaded, LeecherError> {
    validate_file_name(&request.file_name)?;
    if shutdown.is_shutdown() {
        return Err(LeecherError::Cancelled);
    }

    // Discovery. An empty peer list is a valid tracker answer that simply
    // means "try again later"; for one download attempt it is fatal.
    let mut tracker =
        TrackerClient::connect(config.tracker_addr, config.discovery_timeout).await?;
    let peers = tracker.request_peers(&request.file_name).await?;
    if peers.is_empty() {
        return Err(LeecherError::NoSeeders(request.file_name));
    }

    // Sizing. The tracker refusing the count means it never saw the file.
    let chunk_count = match tracker.chunk_count(&request.file_name).await {
        Ok(count) if count > 0 => count,
        Ok(_) => return Err(LeecherError::NoSeeders(request.file_name)),
        Err(TrackerError::Rejected(_)) => {
            return Err(LeecherError::NoSeeders(request.file_name))
        }
        Err(error) => return Err(error.into()),
    };
    info!(
        file = %request.file_name,
        chunk_count,
        seeders = peers.len(),
        "starting download"
    );

    // Expected digests must be in hand before any chunk may be accepted.
    let digests =
        fetch_expected_digests(&config, &peers, &request.file_name, chunk_count, &shutdown)
            .await?;

    let scheduler = Arc::new(ChunkScheduler::new(chunk_count, config.retry_budget));
    let worker_count = config.effective_parallelism().min(peers.len());
    let context = WorkerContext {
        config: config.clone(),
        file_name: request.file_name.clone(),
        scheduler: scheduler.clone(),
        peers: Arc::new(RwLock::new(peers)),
        digests: Arc::new(digests),
        peers_refreshed: Arc::new(AtomicBool::new(false)),
        shutdown,
        progress,
    };

    let mut workers = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let context = context.clone();
        workers.push(tokio::spawn(worker_loop(context, worker_id)));
    }

    // Keep the first worker error; later ones are echoes of the same
    // failure or cancellation.
    let mut failure: Option<LeecherError> = None;
    for worker in workers {
        let result = match worker.await {
            Ok(result) => result,
            Err(join_error) => Err(LeecherError::Io(std::io::Error::other(join_error))),
        };
        if let Err(error) = result {
            if failure.is_none() {
                failure = Some(error);
            }
        }
    }
    if let Some(error) = failure {
        return Err(error);
    }

    let chunks = scheduler
        .take_chunks()
        .ok_or_else(|| LeecherError::Io(std::io::Error::other("result buffer incomplete")))?;
    write_output(&config, &request, chunks).await
}

/// One download worker: pull an index, pick a seeder round-robin from a
/// worker-specific offset, fetch, verify, store; re-queue on any failure.
async fn worker_loop(context: WorkerContext, worker_id: usize) -> Result<(), LeecherError> {
    let mut shutdown = context.shutdown.clone();
    let mut rotation = worker_id;
    loop {
        if shutdown.is_shutdown() {
            return Err(LeecherError::Cancelled);
        }
        if let Some(failed) = context.scheduler.failed() {
            return Err(LeecherError::FailedChunk {
                index: failed.index,
                attempts: failed.attempts,
            });
        }
        if context.scheduler.is_complete() {
            return Ok(());
        }

        let Some(index) = context.scheduler.try_next() else {
            // Queue is empty but chunks are still in flight elsewhere;
            // park until something changes. The sleep covers the gap
            // between the emptiness check and waiter registration.
            tokio::select! {
                _ = context.scheduler.wait_for_work() => {}
                _ = shutdown.recv() => return Err(LeecherError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            continue;
        };

        let peer = {
            let peers = context.peers.read();
            peers[rotation % peers.len()]
        };
        rotation += 1;

        let attempt = tokio::select! {
            result = fetch_chunk(&context, peer, index) => result,
            _ = shutdown.recv() => return Err(LeecherError::Cancelled),
        };

        match attempt {
            Ok(data) => {
                debug!(chunk = index, %peer, len = data.len(), "chunk verified");
                context.scheduler.complete(index, data);
                publish_progress(&context);
            }
            Err(reason) => {
                debug!(chunk = index, %peer, %reason, "chunk attempt failed");
                match context.scheduler.requeue(index) {
                    Requeue::Retry { failures } => {
                        maybe_refresh_peers(&context, failures).await;
                    }
                    Requeue::Exhausted { failures } => {
                        warn!(chunk = index, failures, "retry budget exhausted");
                        return Err(LeecherError::FailedChunk {
                            index,
                            attempts: failures,
                        });
                    }
                }
            }
        }
    }
}

/// Fetches one chunk over a fresh connection and verifies it against the
/// expected digest. The digest carried inside ChunkData is the seeder's
/// claim and is deliberately ignored here; only the pre-fetched vector
/// gates acceptance.
async fn fetch_chunk(
    context: &WorkerContext,
    peer: PeerEndpoint,
    index: u32,
) -> Result<Bytes, AttemptError> {
    let mut transport =
        FrameTransport::connect(peer.addr(), context.config.chunk_timeout).await?;
    transport
        .send(&Message::Get {
            file_name: context.file_name.clone(),
            chunk_index: index,
        })
        .await?;
    match transport.receive().await? {
        Message::ChunkData {
            chunk_index, data, ..
        } => {
            if chunk_index != index {
                return Err(AttemptError::WrongIndex { got: chunk_index });
            }
            let digest: [u8; 32] = Sha256::digest(&data).into();
            if digest != context.digests[index as usize] {
                return Err(AttemptError::DigestMismatch);
            }
            Ok(data)
        }
        Message::Error { text } => Err(AttemptError::Refused(text)),
        _ => Err(AttemptError::UnexpectedReply),
    }
}

/// Asks seeders, in tracker order, for the file's digest vector.
async fn fetch_expected_digests(
    config: &Config,
    peers: &[PeerEndpoint],
    file_name: &str,
    chunk_count: u32,
    shutdown: &Shutdown,
) -> Result<Vec<[u8; 32]>, LeecherError> {
    let mut shutdown = shutdown.clone();
    for peer in peers {
        let attempt = tokio::select! {
            result = request_digests(config, *peer, file_name) => result,
            _ = shutdown.recv() => return Err(LeecherError::Cancelled),
        };
        match attempt {
            Ok(digests) if digests.len() == chunk_count as usize => return Ok(digests),
            Ok(digests) => {
                debug!(%peer, got = digests.len(), expected = chunk_count, "digest vector has wrong length");
            }
            Err(error) => {
                debug!(%peer, %error, "digest fetch failed");
            }
        }
    }
    Err(LeecherError::HashesUnavailable(file_name.to_string()))
}

async fn request_digests(
    config: &Config,
    peer: PeerEndpoint,
    file_name: &str,
) -> Result<Vec<[u8; 32]>, AttemptError> {
    let mut transport = FrameTransport::connect(peer.addr(), config.chunk_timeout).await?;
    transport
        .send(&Message::GetHashes {
            file_name: file_name.to_string(),
        })
        .await?;
    match transport.receive().await? {
        Message::ChunkHashes { digests } => Ok(digests),
        Message::Error { text } => Err(AttemptError::Refused(text)),
        _ => Err(AttemptError::UnexpectedReply),
    }
}

/// After a chunk has failed against as many seeders as are known, query
/// the tracker once for a fresh list before the budget runs out.
async fn maybe_refresh_peers(context: &WorkerContext, failures: u32) {
    let known = context.peers.read().len() as u32;
    if failures < known || context.peers_refreshed.swap(true, Ordering::SeqCst) {
        return;
    }

    let refreshed = async {
        let mut tracker = TrackerClient::connect(
            context.config.tracker_addr,
            context.config.discovery_timeout,
        )
        .await?;
        tracker.request_peers(&context.file_name).await
    }
    .await;

    match refreshed {
        Ok(peers) if !peers.is_empty() => {
            info!(count = peers.len(), "refreshed seeder list");
            *context.peers.write() = peers;
        }
        Ok(_) => debug!("tracker returned no seeders on refresh"),
        Err(error) => debug!(%error, "peer list refresh failed"),
    }
}

fn publish_progress(context: &WorkerContext) {
    if let Some(sender) = &context.progress {
        let _ = sender.send(Progress {
            completed: context.scheduler.completed_count(),
            total: context.scheduler.total(),
        });
    }
}

/// Writes chunks to `<name>.part` and renames into place. The partial
/// file never survives an error.
async fn write_output(
    config: &Config,
    request: &DownloadRequest,
    chunks: Vec<Bytes>,
) -> Result<Downloaded, LeecherError> {
    tokio::fs::create_dir_all(&config.download_dir).await?;
    let final_path = config.download_dir.join(&request.file_name);
    let part_path = config
        .download_dir
        .join(format!("{}.part", request.file_name));

    let chunk_count = chunks.len() as u32;
    let written = write_part(&part_path, &chunks, request).await;
    let total_len = match written {
        Ok(total_len) => total_len,
        Err(error) => {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(error);
        }
    };

    if let Err(error) = tokio::fs::rename(&part_path, &final_path).await {
        let _ = tokio::fs::remove_file(&part_path).await;
        return Err(error.into());
    }

    info!(path = %final_path.display(), total_len, chunk_count, "download complete");
    Ok(Downloaded {
        path: final_path,
        chunk_count,
        total_len,
    })
}

async fn write_part(
    part_path: &Path,
    chunks: &[Bytes],
    request: &DownloadRequest,
) -> Result<u64, LeecherError> {
    let mut file = tokio::fs::File::create(part_path).await?;
    let mut hasher = request.expected_file_digest.map(|_| Sha256::new());
    let mut total_len = 0u64;
    for chunk in chunks {
        file.write_all(chunk).await?;
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(chunk);
        }
        total_len += chunk.len() as u64;
    }
    file.sync_all().await?;

    if let (Some(hasher), Some(expected)) = (hasher, request.expected_file_digest) {
        let digest: [u8; 32] = hasher.finalize().into();
        if digest != expected {
            return Err(LeecherError::FailedFile(request.file_name.clone()));
        }
    }
    Ok(total_len)
}

/// The file name must be a single plain path component so it cannot
/// escape the download directory.
fn validate_file_name(name: &str) -> Result<(), LeecherError> {
    if name.is_empty() || name.len() > MAX_FILE_NAME_LEN {
        return Err(LeecherError::InvalidFileName(name.to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(component)), None)
            if component == std::ffi::OsStr::new(name) =>
        {
            Ok(())
        }
        _ => Err(LeecherError::InvalidFileName(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names_only() {
        validate_file_name("hello.bin").unwrap();
        validate_file_name("no extension").unwrap();
        for bad in ["", ".", "..", "a/b", "/etc/passwd", "../up.bin"] {
            assert!(
                matches!(
                    validate_file_name(bad),
                    Err(LeecherError::InvalidFileName(_))
                ),
                "accepted {bad:?}"
            );
        }
    }
}
