use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors surfaced by the tracker server and its client side.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec failure on a reply we solicited.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No reply arrived within the discovery timeout.
    #[error("tracker timeout")]
    Timeout,

    /// The tracker answered with an Error control message.
    #[error("tracker rejected request: {0}")]
    Rejected(String),

    /// The tracker answered with a message that does not fit the request.
    #[error("unexpected tracker response: {0}")]
    UnexpectedResponse(&'static str),
}
