use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::protocol::PeerEndpoint;

/// One live seeder of one file. Identity is (ip, port); `last_seen` is
/// refreshed by registrations and keepalives.
#[derive(Debug, Clone)]
pub struct SeederEntry {
    pub ip: IpAddr,
    pub port: u16,
    last_seen: Instant,
}

impl SeederEntry {
    fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port,
            last_seen: Instant::now(),
        }
    }

    fn matches(&self, ip: IpAddr, port: u16) -> bool {
        self.ip == ip && self.port == port
    }

    fn endpoint(&self) -> PeerEndpoint {
        PeerEndpoint::new(self.ip, self.port)
    }
}

/// Per-file registry state: the chunk count fixed by the first
/// registration, and the seeders currently serving it in insertion order.
#[derive(Debug)]
struct FileEntry {
    chunk_count: u32,
    seeders: Vec<SeederEntry>,
}

/// Outcome of a registration attempt.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum RegisterOutcome {
    Ok,
    /// The file is already registered with a different chunk count; the
    /// registry is left unchanged.
    ChunkCountConflict { registered: u32 },
    /// A chunk count of zero is never valid.
    ZeroChunkCount,
}

/// The tracker's shared state: file name to chunk count and live seeders.
///
/// All access happens under a single mutex owned by the server; methods
/// here are synchronous and never block. Replies are encoded from the
/// snapshots these methods return, outside the lock.
#[derive(Debug, Default)]
pub(super) struct Registry {
    files: HashMap<String, FileEntry>,
}

impl Registry {
    /// Upserts a seeder for a file. The first registration fixes the
    /// file's chunk count; later ones must agree with it.
    pub fn register(
        &mut self,
        file_name: &str,
        ip: IpAddr,
        port: u16,
        chunk_count: u32,
    ) -> RegisterOutcome {
        if chunk_count == 0 {
            return RegisterOutcome::ZeroChunkCount;
        }

        match self.files.get_mut(file_name) {
            Some(entry) => {
                if entry.chunk_count != chunk_count {
                    return RegisterOutcome::ChunkCountConflict {
                        registered: entry.chunk_count,
                    };
                }
                match entry.seeders.iter_mut().find(|s| s.matches(ip, port)) {
                    Some(seeder) => seeder.last_seen = Instant::now(),
                    None => entry.seeders.push(SeederEntry::new(ip, port)),
                }
            }
            None => {
                self.files.insert(
                    file_name.to_string(),
                    FileEntry {
                        chunk_count,
                        seeders: vec![SeederEntry::new(ip, port)],
                    },
                );
            }
        }
        RegisterOutcome::Ok
    }

    /// Refreshes `last_seen` for an endpoint across every file it serves.
    /// Returns `true` if the endpoint was known anywhere.
    pub fn keepalive(&mut self, ip: IpAddr, port: u16) -> bool {
        let now = Instant::now();
        let mut known = false;
        for entry in self.files.values_mut() {
            if let Some(seeder) = entry.seeders.iter_mut().find(|s| s.matches(ip, port)) {
                seeder.last_seen = now;
                known = true;
            }
        }
        known
    }

    /// Snapshot of the live seeders for a file, in registration order.
    /// Unknown files yield an empty list.
    pub fn peers(&self, file_name: &str) -> Vec<PeerEndpoint> {
        self.files
            .get(file_name)
            .map(|entry| entry.seeders.iter().map(SeederEntry::endpoint).collect())
            .unwrap_or_default()
    }

    /// Chunk count recorded for a file, if any seeder ever registered it.
    pub fn chunk_count(&self, file_name: &str) -> Option<u32> {
        self.files.get(file_name).map(|entry| entry.chunk_count)
    }

    /// Drops every seeder not seen within `max_age` and every file left
    /// without seeders. Returns the number of seeders evicted.
    pub fn reap(&mut self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.files.retain(|_, entry| {
            let before = entry.seeders.len();
            entry
                .seeders
                .retain(|s| now.duration_since(s.last_seen) < max_age);
            evicted += before - entry.seeders.len();
            !entry.seeders.is_empty()
        });
        evicted
    }

    /// Number of files with at least one seeder.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}
