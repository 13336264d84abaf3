//! Wire protocol shared by the tracker, seeder and leecher roles.
//!
//! Every exchange in the swarm is a single self-describing [`Message`]. A
//! message is a tagged binary record: one kind byte selecting the variant,
//! followed by that variant's fixed field layout (big-endian integers,
//! length-prefixed UTF-8 strings, length-prefixed byte payloads). Kind
//! bytes below 16 are requests (commands), 16 and above are replies
//! (controls); [`Message::ChunkData`] is the only variant carrying a bulk
//! body.
//!
//! The same encoding serves both transports:
//!
//! - **Datagram** (tracker): one encoded message per datagram, at most
//!   [`MAX_DATAGRAM_SIZE`](crate::constants::MAX_DATAGRAM_SIZE) bytes.
//! - **Stream** (seeder): frames of a 4-byte big-endian length prefix
//!   followed by the encoded message, read one at a time by
//!   [`FrameTransport`].
//!
//! Decoding never trusts the remote end: truncated records, unknown kind
//! bytes, oversized payloads and trailing garbage are all rejected with a
//! [`ProtocolError`].

mod error;
mod message;
mod transport;

pub use error::ProtocolError;
pub use message::{Message, MessageId, PeerEndpoint};
pub use transport::FrameTransport;

#[cfg(test)]
mod tests;
