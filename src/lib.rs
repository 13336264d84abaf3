//! seedling - peer-to-peer chunked file distribution
//!
//! A small swarm protocol in three cooperating roles over one shared
//! binary codec:
//!
//! - [`tracker`] - the directory service: a UDP server mapping file names
//!   to live seeder endpoints, with chunk-count memoisation and timed
//!   eviction of silent seeders
//! - [`seeder`] - a TCP server holding files as fixed-size chunks with
//!   per-chunk SHA-256 digests, serving one chunk per connection
//! - [`leecher`] - the parallel multi-source download engine: discovery,
//!   verification against expected digests, retry across seeders, atomic
//!   reassembly
//! - [`protocol`] - the message codec and framed stream transport shared
//!   by all of the above
//!
//! A [`peer::Peer`] ties the roles together as states of one process: a
//! completed download promotes the leecher into a seeder of the new file.
//!
//! The interactive frontend (file picker, progress bars, notifications,
//! CLI) lives outside this crate and drives it through [`config::Config`],
//! [`peer::Peer`] and the per-role types re-exported below.

pub mod config;
pub mod constants;
pub mod leecher;
pub mod peer;
pub mod protocol;
pub mod seeder;
pub mod shutdown;
pub mod tracker;

pub use config::{Config, ConfigError};
pub use leecher::{download, DownloadRequest, Downloaded, LeecherError, Progress};
pub use peer::Peer;
pub use protocol::{FrameTransport, Message, MessageId, PeerEndpoint, ProtocolError};
pub use seeder::{ChunkStore, Seeder, SeederError};
pub use shutdown::{Shutdown, ShutdownHandle};
pub use tracker::{Tracker, TrackerClient, TrackerError};
