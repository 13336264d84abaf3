use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::error::SeederError;
use super::store::ChunkStore;
use crate::config::Config;
use crate::protocol::{FrameTransport, Message};
use crate::shutdown::Shutdown;
use crate::tracker::TrackerClient;

/// The seeder role: a stream listener serving chunks of hosted files.
///
/// Cloning a `Seeder` clones a handle to the same listener and file table,
/// so one clone can run the accept loop while another keeps hosting new
/// files (the leecher's promotion path relies on this).
#[derive(Clone)]
pub struct Seeder {
    inner: Arc<Inner>,
}

struct Inner {
    listener: TcpListener,
    local_addr: SocketAddr,
    files: DashMap<String, Arc<ChunkStore>>,
    config: Arc<Config>,
    running: AtomicBool,
}

impl Seeder {
    /// Binds the stream listener at `config.seeder_bind` (port 0 for an
    /// ephemeral port, announced to the tracker on registration).
    pub async fn bind(config: Arc<Config>) -> Result<Self, SeederError> {
        let listener = TcpListener::bind(config.seeder_bind).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "seeder listening");
        Ok(Self {
            inner: Arc::new(Inner {
                listener,
                local_addr,
                files: DashMap::new(),
                config,
                running: AtomicBool::new(false),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Port leechers connect to; carried in Register announcements.
    pub fn port(&self) -> u16 {
        self.inner.local_addr.port()
    }

    /// Returns `true` if this seeder hosts the named file.
    pub fn serves(&self, file_name: &str) -> bool {
        self.inner.files.contains_key(file_name)
    }

    /// Ingests a local file and registers it with the tracker.
    pub async fn host_file(&self, path: &Path) -> Result<(), SeederError> {
        self.announce(path, false).await
    }

    /// Ingests a file this peer just downloaded and announces the role
    /// change to the tracker.
    pub async fn adopt_file(&self, path: &Path) -> Result<(), SeederError> {
        self.announce(path, true).await
    }

    async fn announce(&self, path: &Path, promoted: bool) -> Result<(), SeederError> {
        let store = Arc::new(ChunkStore::ingest(path, self.inner.config.chunk_size).await?);
        let file_name = store.file_name().to_string();
        let chunk_count = store.chunk_count();

        let mut tracker = TrackerClient::connect(
            self.inner.config.tracker_addr,
            self.inner.config.discovery_timeout,
        )
        .await?;
        if promoted {
            tracker
                .become_seeder(&file_name, self.port(), chunk_count)
                .await?;
        } else {
            tracker.register(&file_name, self.port(), chunk_count).await?;
        }

        info!(file = %file_name, chunk_count, port = self.port(), "hosting file");
        self.inner.files.insert(file_name, store);
        Ok(())
    }

    /// Accepts and serves connections until shutdown. At most
    /// `max_inflight_serves` connections are handled at once; excess
    /// connections wait in the accept backlog for a free slot.
    pub async fn run(&self, shutdown: Shutdown) -> Result<(), SeederError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(SeederError::AlreadyRunning);
        }

        let heartbeat = tokio::spawn(heartbeat_loop(
            self.inner.config.clone(),
            self.port(),
            shutdown.clone(),
        ));

        let slots = Arc::new(Semaphore::new(self.inner.config.max_inflight_serves));
        let mut shutdown_rx = shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = self.inner.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(error) => {
                            warn!(%error, "accept failed");
                            continue;
                        }
                    };
                    // Excess connections wait here for a serve slot.
                    let permit = tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        permit = slots.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };
                    let inner = self.inner.clone();
                    tokio::spawn(async move {
                        serve_connection(inner, stream, peer).await;
                        drop(permit);
                    });
                }
            }
        }

        heartbeat.abort();
        self.inner.running.store(false, Ordering::SeqCst);
        info!("seeder stopped");
        Ok(())
    }
}

/// Handles one connection: exactly one request frame, one reply frame.
async fn serve_connection(inner: Arc<Inner>, stream: TcpStream, peer: SocketAddr) {
    let mut transport = FrameTransport::new(stream, inner.config.serve_timeout);
    let request = match transport.receive().await {
        Ok(request) => request,
        Err(error) => {
            debug!(%peer, %error, "dropping unreadable request");
            return;
        }
    };

    let reply = match request {
        Message::Get {
            file_name,
            chunk_index,
        } => match lookup(&inner, &file_name) {
            Some(store) => match (store.chunk(chunk_index), store.digest(chunk_index)) {
                (Some(data), Some(digest)) => {
                    debug!(%peer, file = %file_name, chunk_index, len = data.len(), "serving chunk");
                    Message::ChunkData {
                        chunk_index,
                        digest,
                        data,
                    }
                }
                _ => Message::Error {
                    text: format!(
                        "chunk index {chunk_index} out of range for {file_name} ({} chunks)",
                        store.chunk_count()
                    ),
                },
            },
            None => Message::Error {
                text: format!("unknown file: {file_name}"),
            },
        },
        Message::GetCount { file_name } => match lookup(&inner, &file_name) {
            Some(store) => Message::ChunkCount {
                chunk_count: store.chunk_count(),
            },
            None => Message::Error {
                text: format!("unknown file: {file_name}"),
            },
        },
        Message::GetHashes { file_name } => match lookup(&inner, &file_name) {
            Some(store) => Message::ChunkHashes {
                digests: store.digests().to_vec(),
            },
            None => Message::Error {
                text: format!("unknown file: {file_name}"),
            },
        },
        other => Message::Error {
            text: format!("unsupported request: {:?}", other.id()),
        },
    };

    if let Err(error) = transport.send(&reply).await {
        debug!(%peer, %error, "failed to send reply");
    }
}

/// Clones the store handle out of the table so no map guard is held while
/// the reply is written.
fn lookup(inner: &Inner, file_name: &str) -> Option<Arc<ChunkStore>> {
    inner.files.get(file_name).map(|entry| entry.clone())
}

/// Beacons a keepalive to the tracker until shutdown.
async fn heartbeat_loop(config: Arc<Config>, port: u16, shutdown: Shutdown) {
    let mut shutdown = shutdown;
    let mut client = match TrackerClient::connect(config.tracker_addr, config.discovery_timeout).await
    {
        Ok(client) => client,
        Err(error) => {
            warn!(%error, "heartbeat disabled: cannot reach tracker");
            return;
        }
    };

    let mut ticker = tokio::time::interval(config.keepalive_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it, registration just ran.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                if let Err(error) = client.keepalive(port).await {
                    warn!(%error, "keepalive failed");
                }
            }
        }
    }
}
