use thiserror::Error;

/// Errors raised while encoding, decoding or transporting messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The record ended before its fields did.
    #[error("truncated message")]
    Truncated,

    /// The kind byte does not name a known message.
    #[error("unknown message kind: {0}")]
    UnknownKind(u8),

    /// A frame or payload exceeds its size cap.
    #[error("size limit exceeded: {0} bytes")]
    SizeExceeded(usize),

    /// A structurally valid record with an impossible field value.
    #[error("invalid message: {0}")]
    Invalid(String),

    /// A string field holds bytes that are not UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// Bytes remained after the last field of the record.
    #[error("trailing bytes after message")]
    TrailingBytes,

    /// The stream was closed mid-frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// A send, receive or connect exceeded its deadline.
    #[error("timeout")]
    Timeout,
}
