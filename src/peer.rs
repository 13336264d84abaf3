//! A peer process that moves between the leecher and seeder roles.
//!
//! One [`Peer`] owns a datagram client toward the tracker and one stream
//! acceptor, bound up front. Seeding a local file and finishing a
//! download both land in the same place: the file is ingested, announced,
//! and served from this process. Promotion after a download is a state
//! transition: the serve loop and heartbeat start once and pick up every
//! file hosted later; no second process or socket appears.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::leecher::{self, DownloadRequest, Downloaded, LeecherError, Progress};
use crate::seeder::{Seeder, SeederError};
use crate::shutdown::Shutdown;

/// One swarm participant.
pub struct Peer {
    config: Arc<Config>,
    seeder: Seeder,
    shutdown: Shutdown,
    serving: bool,
}

impl Peer {
    /// Binds the peer's stream listener. The shutdown signal stops every
    /// activity this peer ever starts.
    pub async fn bind(config: Arc<Config>, shutdown: Shutdown) -> Result<Self, SeederError> {
        let seeder = Seeder::bind(config.clone()).await?;
        Ok(Self {
            config,
            seeder,
            shutdown,
            serving: false,
        })
    }

    /// The serving half of this peer.
    pub fn seeder(&self) -> &Seeder {
        &self.seeder
    }

    /// Hosts a local file: ingest, register with the tracker, serve.
    pub async fn seed(&mut self, path: &Path) -> Result<(), SeederError> {
        self.seeder.host_file(path).await?;
        self.ensure_serving();
        Ok(())
    }

    /// Downloads a file from the swarm, then promotes this peer to one of
    /// its seeders.
    pub async fn download(&mut self, request: DownloadRequest) -> Result<Downloaded, LeecherError> {
        self.download_with_progress(request, None).await
    }

    /// [`Peer::download`] with progress snapshots published to `progress`.
    pub async fn download_with_progress(
        &mut self,
        request: DownloadRequest,
        progress: Option<Arc<watch::Sender<Progress>>>,
    ) -> Result<Downloaded, LeecherError> {
        let downloaded = leecher::download(
            self.config.clone(),
            request,
            self.shutdown.clone(),
            progress,
        )
        .await?;

        self.seeder
            .adopt_file(&downloaded.path)
            .await
            .map_err(LeecherError::Promotion)?;
        self.ensure_serving();
        info!(path = %downloaded.path.display(), "promoted to seeder");
        Ok(downloaded)
    }

    /// Starts the serve loop and heartbeat on first use; later hosted
    /// files are picked up by the running loop.
    fn ensure_serving(&mut self) {
        if self.serving {
            return;
        }
        self.serving = true;
        let seeder = self.seeder.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(error) = seeder.run(shutdown).await {
                warn!(%error, "serve loop ended");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::protocol::{FrameTransport, Message};
    use crate::tracker::{Tracker, TrackerClient};

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 13) % 256) as u8).collect()
    }

    #[tokio::test]
    async fn downloaded_peer_becomes_a_seeder() {
        let download_dir = TempDir::new().unwrap();
        let seed = Arc::new(Config {
            tracker_addr: "127.0.0.1:0".parse().unwrap(),
            download_dir: download_dir.path().to_path_buf(),
            chunk_size: 1024,
            chunk_timeout: Duration::from_secs(2),
            discovery_timeout: Duration::from_secs(2),
            ..Config::default()
        });
        let tracker = Tracker::bind(seed.clone()).await.unwrap();
        let config = Arc::new(Config {
            tracker_addr: tracker.local_addr(),
            ..(*seed).clone()
        });
        let (handle, shutdown) = Shutdown::new();
        {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { tracker.run(shutdown).await });
        }

        // The original seeder.
        let data = patterned(3 * 1024 + 77);
        let source_dir = TempDir::new().unwrap();
        let source = source_dir.path().join("shared.bin");
        std::fs::write(&source, &data).unwrap();
        let mut origin = Peer::bind(config.clone(), shutdown.clone()).await.unwrap();
        origin.seed(&source).await.unwrap();

        // The leecher downloads and is promoted in place.
        let mut fetcher = Peer::bind(config.clone(), shutdown.clone()).await.unwrap();
        let downloaded = fetcher
            .download(DownloadRequest::new("shared.bin"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&downloaded.path).unwrap(), data);

        // The tracker now lists both peers.
        let mut client = TrackerClient::connect(config.tracker_addr, config.discovery_timeout)
            .await
            .unwrap();
        let peers = client.request_peers("shared.bin").await.unwrap();
        let ports: Vec<u16> = peers.iter().map(|p| p.port).collect();
        assert!(ports.contains(&origin.seeder().port()));
        assert!(ports.contains(&fetcher.seeder().port()));

        // And the promoted peer really serves chunks.
        let mut transport =
            FrameTransport::connect(fetcher.seeder().local_addr(), Duration::from_secs(2))
                .await
                .unwrap();
        transport
            .send(&Message::Get {
                file_name: "shared.bin".into(),
                chunk_index: 0,
            })
            .await
            .unwrap();
        match transport.receive().await.unwrap() {
            Message::ChunkData { data: body, .. } => assert_eq!(&body[..], &data[..1024]),
            other => panic!("unexpected reply: {:?}", other.id()),
        }

        handle.shutdown();
    }
}
