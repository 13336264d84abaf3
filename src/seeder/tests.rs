use super::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::config::Config;
use crate::protocol::{FrameTransport, Message};
use crate::shutdown::{Shutdown, ShutdownHandle};
use crate::tracker::{Tracker, TrackerClient};

fn write_file(dir: &TempDir, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let path = dir.path().join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

#[tokio::test]
async fn ingest_splits_with_short_last_chunk() {
    let dir = TempDir::new().unwrap();
    let (path, data) = write_file(&dir, "sample.bin", 2500);

    let store = ChunkStore::ingest(&path, 1024).await.unwrap();
    assert_eq!(store.file_name(), "sample.bin");
    assert_eq!(store.total_len(), 2500);
    assert_eq!(store.chunk_count(), 3);
    assert_eq!(store.chunk(0).unwrap().len(), 1024);
    assert_eq!(store.chunk(1).unwrap().len(), 1024);
    assert_eq!(store.chunk(2).unwrap().len(), 452);
    assert!(store.chunk(3).is_none());

    // Concatenation in index order reproduces the file exactly.
    let mut joined = Vec::new();
    for i in 0..store.chunk_count() {
        joined.extend_from_slice(&store.chunk(i).unwrap());
    }
    assert_eq!(joined, data);

    // Digests match the chunk content.
    for i in 0..store.chunk_count() {
        let expected: [u8; 32] = Sha256::digest(&store.chunk(i).unwrap()).into();
        assert_eq!(store.digest(i).unwrap(), expected);
    }
}

#[tokio::test]
async fn ingest_exact_multiple_has_no_short_chunk() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_file(&dir, "even.bin", 2048);
    let store = ChunkStore::ingest(&path, 1024).await.unwrap();
    assert_eq!(store.chunk_count(), 2);
    assert_eq!(store.chunk(1).unwrap().len(), 1024);
}

#[tokio::test]
async fn ingest_rejects_empty_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.bin");
    std::fs::write(&path, b"").unwrap();
    assert!(matches!(
        ChunkStore::ingest(&path, 1024).await,
        Err(SeederError::EmptyFile(_))
    ));
}

#[tokio::test]
async fn ingest_rejects_files_with_too_many_chunks() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_file(&dir, "huge.bin", crate::constants::MAX_CHUNK_HASHES_LEN + 1);
    // A one-byte chunk size makes the digest-vector cap reachable
    // without a multi-gigabyte fixture.
    assert!(matches!(
        ChunkStore::ingest(&path, 1).await,
        Err(SeederError::TooManyChunks { .. })
    ));
    assert!(ChunkStore::ingest(&path, 2).await.is_ok());
}

struct Swarm {
    config: Arc<Config>,
    _handle: ShutdownHandle,
}

/// Starts a tracker and a serving seeder on ephemeral ports.
async fn start_swarm(chunk_size: usize) -> (Swarm, Seeder) {
    let base = Arc::new(Config {
        tracker_addr: "127.0.0.1:0".parse().unwrap(),
        chunk_size,
        discovery_timeout: Duration::from_secs(2),
        serve_timeout: Duration::from_secs(5),
        ..Config::default()
    });
    let tracker = Tracker::bind(base.clone()).await.unwrap();
    let config = Arc::new(Config {
        tracker_addr: tracker.local_addr(),
        ..(*base).clone()
    });

    let (handle, shutdown) = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { tracker.run(shutdown).await });
    }

    let seeder = Seeder::bind(config.clone()).await.unwrap();
    {
        let seeder = seeder.clone();
        tokio::spawn(async move { seeder.run(shutdown).await });
    }

    (
        Swarm {
            config,
            _handle: handle,
        },
        seeder,
    )
}

#[tokio::test]
async fn serves_a_valid_chunk() {
    let (swarm, seeder) = start_swarm(1024).await;
    let dir = TempDir::new().unwrap();
    let (path, data) = write_file(&dir, "served.bin", 3000);
    seeder.host_file(&path).await.unwrap();
    assert!(seeder.serves("served.bin"));

    let mut transport =
        FrameTransport::connect(seeder.local_addr(), Duration::from_secs(2))
            .await
            .unwrap();
    transport
        .send(&Message::Get {
            file_name: "served.bin".into(),
            chunk_index: 1,
        })
        .await
        .unwrap();
    match transport.receive().await.unwrap() {
        Message::ChunkData {
            chunk_index,
            digest,
            data: body,
        } => {
            assert_eq!(chunk_index, 1);
            assert_eq!(&body[..], &data[1024..2048]);
            let expected: [u8; 32] = Sha256::digest(&body).into();
            assert_eq!(digest, expected);
        }
        other => panic!("unexpected reply: {:?}", other.id()),
    }
    drop(swarm);
}

#[tokio::test]
async fn rejects_bad_index_and_unknown_file() {
    let (swarm, seeder) = start_swarm(1024).await;
    let dir = TempDir::new().unwrap();
    let (path, _) = write_file(&dir, "bounds.bin", 3000);
    seeder.host_file(&path).await.unwrap();

    let mut transport =
        FrameTransport::connect(seeder.local_addr(), Duration::from_secs(2))
            .await
            .unwrap();
    transport
        .send(&Message::Get {
            file_name: "bounds.bin".into(),
            chunk_index: 3,
        })
        .await
        .unwrap();
    assert!(matches!(
        transport.receive().await.unwrap(),
        Message::Error { .. }
    ));

    let mut transport =
        FrameTransport::connect(seeder.local_addr(), Duration::from_secs(2))
            .await
            .unwrap();
    transport
        .send(&Message::Get {
            file_name: "ghost.bin".into(),
            chunk_index: 0,
        })
        .await
        .unwrap();
    assert!(matches!(
        transport.receive().await.unwrap(),
        Message::Error { .. }
    ));
    drop(swarm);
}

#[tokio::test]
async fn answers_count_and_hashes() {
    let (swarm, seeder) = start_swarm(1024).await;
    let dir = TempDir::new().unwrap();
    let (path, _) = write_file(&dir, "meta.bin", 2500);
    seeder.host_file(&path).await.unwrap();

    let mut transport =
        FrameTransport::connect(seeder.local_addr(), Duration::from_secs(2))
            .await
            .unwrap();
    transport
        .send(&Message::GetCount {
            file_name: "meta.bin".into(),
        })
        .await
        .unwrap();
    assert!(matches!(
        transport.receive().await.unwrap(),
        Message::ChunkCount { chunk_count: 3 }
    ));

    let mut transport =
        FrameTransport::connect(seeder.local_addr(), Duration::from_secs(2))
            .await
            .unwrap();
    transport
        .send(&Message::GetHashes {
            file_name: "meta.bin".into(),
        })
        .await
        .unwrap();
    match transport.receive().await.unwrap() {
        Message::ChunkHashes { digests } => assert_eq!(digests.len(), 3),
        other => panic!("unexpected reply: {:?}", other.id()),
    }
    drop(swarm);
}

#[tokio::test]
async fn serves_concurrent_requests() {
    let (swarm, seeder) = start_swarm(1024).await;
    let dir = TempDir::new().unwrap();
    let (path, data) = write_file(&dir, "busy.bin", 8 * 1024);
    seeder.host_file(&path).await.unwrap();

    let mut tasks = Vec::new();
    for index in 0..8u32 {
        let addr = seeder.local_addr();
        let expected = data[(index as usize) * 1024..(index as usize + 1) * 1024].to_vec();
        tasks.push(tokio::spawn(async move {
            let mut transport = FrameTransport::connect(addr, Duration::from_secs(2))
                .await
                .unwrap();
            transport
                .send(&Message::Get {
                    file_name: "busy.bin".into(),
                    chunk_index: index,
                })
                .await
                .unwrap();
            match transport.receive().await.unwrap() {
                Message::ChunkData { data: body, .. } => assert_eq!(&body[..], expected),
                other => panic!("unexpected reply: {:?}", other.id()),
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    drop(swarm);
}

#[tokio::test]
async fn registration_is_visible_at_the_tracker() {
    let (swarm, seeder) = start_swarm(1024).await;
    let dir = TempDir::new().unwrap();
    let (path, _) = write_file(&dir, "announced.bin", 2048);
    seeder.host_file(&path).await.unwrap();

    let mut client =
        TrackerClient::connect(swarm.config.tracker_addr, swarm.config.discovery_timeout)
            .await
            .unwrap();
    let peers = client.request_peers("announced.bin").await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].port, seeder.port());
    assert_eq!(client.chunk_count("announced.bin").await.unwrap(), 2);
}
