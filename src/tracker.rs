//! Tracker: the swarm's directory service.
//!
//! The tracker is a connectionless request/response server over one UDP
//! socket. It maintains the mapping from file name to the set of live
//! seeder endpoints and remembers each file's authoritative chunk count.
//! Seeders register and beacon keepalives; leechers query for peers and
//! chunk counts. A background reaper evicts seeders whose beacons stop.
//!
//! The tracker keeps no per-client state between datagrams and never
//! fails on malformed input: unparseable datagrams are logged and
//! dropped, and the sender is expected to retry.
//!
//! [`TrackerClient`] is the matching client side used by the seeder
//! (register, keepalive) and the leecher (peer discovery, chunk count).

mod client;
mod error;
mod registry;
mod server;

pub use client::TrackerClient;
pub use error::TrackerError;
pub use registry::SeederEntry;
pub use server::Tracker;
