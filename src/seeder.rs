//! Seeder: serves chunks of hosted files over stream connections.
//!
//! A seeder binds an ephemeral TCP port, splits each hosted file into
//! fixed-size chunks with per-chunk SHA-256 digests, announces the file to
//! the tracker, and then answers one request per inbound connection: a
//! chunk fetch, a chunk count, or the file's digest vector. A heartbeat
//! activity keeps the tracker's liveness timestamp fresh.
//!
//! Chunk data is immutable after ingest, so the serve path reads it
//! without locking; concurrency is bounded only by the in-flight-serve
//! semaphore.

mod error;
mod server;
mod store;

pub use error::SeederError;
pub use server::Seeder;
pub use store::ChunkStore;

#[cfg(test)]
mod tests;
