use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::registry::{RegisterOutcome, Registry};
use crate::config::Config;
use crate::constants::{MAX_DATAGRAM_SIZE, MAX_PEER_LIST_LEN};
use crate::protocol::Message;
use crate::shutdown::Shutdown;
use crate::tracker::TrackerError;

/// The tracker server: one datagram socket, a registry behind a single
/// mutex, and a periodic reaper.
pub struct Tracker {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    registry: Arc<Mutex<Registry>>,
    config: Arc<Config>,
}

impl Tracker {
    /// Binds the tracker socket at `config.tracker_addr`. Port 0 is
    /// honoured (useful in tests); the bound address is available via
    /// [`Tracker::local_addr`].
    pub async fn bind(config: Arc<Config>) -> Result<Self, TrackerError> {
        let socket = UdpSocket::bind(config.tracker_addr).await?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "tracker listening");
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            registry: Arc::new(Mutex::new(Registry::default())),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until the shutdown signal fires. Each datagram is
    /// handled on its own task; the reaper runs alongside.
    pub async fn run(&self, shutdown: Shutdown) -> Result<(), TrackerError> {
        let reaper = tokio::spawn(reap_loop(
            self.registry.clone(),
            self.config.clone(),
            shutdown.clone(),
        ));

        let mut shutdown = shutdown;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = self.socket.recv_from(&mut buf) => {
                    let (len, src) = match received {
                        Ok(pair) => pair,
                        Err(error) => {
                            // Transient socket errors must not take the
                            // directory down.
                            warn!(%error, "datagram receive failed");
                            continue;
                        }
                    };
                    let datagram = Bytes::copy_from_slice(&buf[..len]);
                    let socket = self.socket.clone();
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        handle_datagram(socket, registry, datagram, src).await;
                    });
                }
            }
        }

        reaper.abort();
        info!("tracker stopped");
        Ok(())
    }
}

/// Decodes one datagram, applies it to the registry and sends the reply,
/// if any. Malformed input is dropped; the sender retries.
async fn handle_datagram(
    socket: Arc<UdpSocket>,
    registry: Arc<Mutex<Registry>>,
    datagram: Bytes,
    src: SocketAddr,
) {
    let message = match Message::decode(datagram) {
        Ok(message) => message,
        Err(error) => {
            debug!(%src, %error, "dropping malformed datagram");
            return;
        }
    };

    let Some(reply) = dispatch(&registry, message, src) else {
        return;
    };
    let encoded = match reply.encode() {
        Ok(encoded) => encoded,
        Err(error) => {
            debug!(%src, %error, "failed to encode reply");
            return;
        }
    };
    if let Err(error) = socket.send_to(&encoded, src).await {
        debug!(%src, %error, "failed to send reply");
    }
}

/// Applies a request to the registry and builds the reply. Snapshots are
/// taken under the lock; encoding happens in the caller, outside it.
fn dispatch(
    registry: &Mutex<Registry>,
    message: Message,
    src: SocketAddr,
) -> Option<Message> {
    match message {
        // A completed leecher announcing itself is a registration like
        // any other.
        Message::Register {
            file_name,
            peer_port,
            chunk_count,
        }
        | Message::BecomeSeeder {
            file_name,
            peer_port,
            chunk_count,
        } => {
            let outcome =
                registry
                    .lock()
                    .register(&file_name, src.ip(), peer_port, chunk_count);
            match outcome {
                RegisterOutcome::Ok => {
                    info!(file = %file_name, ip = %src.ip(), port = peer_port, chunk_count, "seeder registered");
                    Some(Message::Ack)
                }
                RegisterOutcome::ChunkCountConflict { registered } => {
                    warn!(file = %file_name, offered = chunk_count, registered, "chunk count conflict");
                    Some(Message::Error {
                        text: format!(
                            "chunk count conflict for {file_name}: registered {registered}, got {chunk_count}"
                        ),
                    })
                }
                RegisterOutcome::ZeroChunkCount => Some(Message::Error {
                    text: format!("rejected {file_name}: chunk count must be at least 1"),
                }),
            }
        }
        Message::KeepAlive { peer_port } => {
            let known = registry.lock().keepalive(src.ip(), peer_port);
            // Unknown endpoints are silently dropped; the seeder will
            // re-register on its next announce.
            known.then_some(Message::Ack)
        }
        Message::Request { file_name } => {
            let mut peers = registry.lock().peers(&file_name);
            if peers.len() > MAX_PEER_LIST_LEN {
                debug!(file = %file_name, total = peers.len(), "truncating peer list");
                peers.truncate(MAX_PEER_LIST_LEN);
            }
            debug!(file = %file_name, count = peers.len(), %src, "peer list requested");
            Some(Message::PeerList { peers })
        }
        Message::GetCount { file_name } => match registry.lock().chunk_count(&file_name) {
            Some(chunk_count) => Some(Message::ChunkCount { chunk_count }),
            None => Some(Message::Error {
                text: format!("unknown file: {file_name}"),
            }),
        },
        other => {
            debug!(%src, kind = ?other.id(), "dropping unexpected message");
            None
        }
    }
}

/// Periodically evicts seeders whose beacons stopped.
async fn reap_loop(registry: Arc<Mutex<Registry>>, config: Arc<Config>, shutdown: Shutdown) {
    let mut shutdown = shutdown;
    let mut ticker = tokio::time::interval(config.reap_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let (evicted, files) = {
                    let mut registry = registry.lock();
                    let evicted = registry.reap(config.liveness_timeout);
                    (evicted, registry.file_count())
                };
                if evicted > 0 {
                    info!(evicted, files, "reaped expired seeders");
                }
            }
        }
    }
}
