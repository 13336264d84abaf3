use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::ProtocolError;
use crate::constants::{
    MAX_BODY_SIZE, MAX_CHUNK_HASHES_LEN, MAX_ERROR_TEXT_LEN, MAX_FILE_NAME_LEN,
    MAX_FRAME_SIZE, MAX_PEER_LIST_LEN,
};

/// Address family tag for an encoded peer endpoint.
const ENDPOINT_TAG_V4: u8 = 4;
const ENDPOINT_TAG_V6: u8 = 6;

/// Kind byte of each message variant.
///
/// Values below 16 are commands (requests); 16 and above are controls
/// (replies). Exactly one side of that split is meaningful per message,
/// which the variant itself guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    /// Seeder announces a hosted file to the tracker.
    Register = 0,
    /// Seeder refreshes its liveness timestamp.
    KeepAlive = 1,
    /// Leecher asks the tracker for the live seeder set of a file.
    Request = 2,
    /// Leecher asks a seeder for one chunk.
    Get = 3,
    /// Leecher asks for a file's chunk count.
    GetCount = 4,
    /// Completed leecher announces itself as a seeder.
    BecomeSeeder = 5,
    /// Leecher asks a seeder for the full chunk-digest vector.
    GetHashes = 6,
    /// Positive acknowledgement.
    Ack = 16,
    /// Negative reply carrying a reason.
    Error = 17,
    /// Snapshot of live seeders for a file.
    PeerList = 18,
    /// One chunk of file content plus its digest.
    ChunkData = 19,
    /// Chunk count of a file.
    ChunkCount = 20,
    /// Per-chunk SHA-256 digests, in index order.
    ChunkHashes = 21,
}

impl MessageId {
    /// Returns `true` for request kinds (commands).
    pub fn is_command(self) -> bool {
        (self as u8) < 16
    }
}

impl TryFrom<u8> for MessageId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(MessageId::Register),
            1 => Ok(MessageId::KeepAlive),
            2 => Ok(MessageId::Request),
            3 => Ok(MessageId::Get),
            4 => Ok(MessageId::GetCount),
            5 => Ok(MessageId::BecomeSeeder),
            6 => Ok(MessageId::GetHashes),
            16 => Ok(MessageId::Ack),
            17 => Ok(MessageId::Error),
            18 => Ok(MessageId::PeerList),
            19 => Ok(MessageId::ChunkData),
            20 => Ok(MessageId::ChunkCount),
            21 => Ok(MessageId::ChunkHashes),
            _ => Err(ProtocolError::UnknownKind(value)),
        }
    }
}

/// A seeder's stream endpoint as carried in PeerList replies.
///
/// On the wire: one address-family tag byte (4 or 6), the raw address
/// octets, then the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerEndpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// The endpoint as a connectable socket address.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self.ip {
            IpAddr::V4(ip) => {
                buf.put_u8(ENDPOINT_TAG_V4);
                buf.put_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                buf.put_u8(ENDPOINT_TAG_V6);
                buf.put_slice(&ip.octets());
            }
        }
        buf.put_u16(self.port);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let tag = get_u8(buf)?;
        let ip = match tag {
            ENDPOINT_TAG_V4 => {
                let octets: [u8; 4] = get_array(buf)?;
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            ENDPOINT_TAG_V6 => {
                let octets: [u8; 16] = get_array(buf)?;
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            other => {
                return Err(ProtocolError::Invalid(format!(
                    "unknown address family tag: {other}"
                )))
            }
        };
        let port = get_u16(buf)?;
        Ok(Self { ip, port })
    }
}

impl std::fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr())
    }
}

/// A protocol message. The variant selects the payload shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Register {
        file_name: String,
        peer_port: u16,
        chunk_count: u32,
    },
    KeepAlive {
        peer_port: u16,
    },
    Request {
        file_name: String,
    },
    Get {
        file_name: String,
        chunk_index: u32,
    },
    GetCount {
        file_name: String,
    },
    BecomeSeeder {
        file_name: String,
        peer_port: u16,
        chunk_count: u32,
    },
    GetHashes {
        file_name: String,
    },
    Ack,
    Error {
        text: String,
    },
    PeerList {
        peers: Vec<PeerEndpoint>,
    },
    ChunkData {
        chunk_index: u32,
        digest: [u8; 32],
        data: Bytes,
    },
    ChunkCount {
        chunk_count: u32,
    },
    ChunkHashes {
        digests: Vec<[u8; 32]>,
    },
}

impl Message {
    /// Kind byte of this message.
    pub fn id(&self) -> MessageId {
        match self {
            Message::Register { .. } => MessageId::Register,
            Message::KeepAlive { .. } => MessageId::KeepAlive,
            Message::Request { .. } => MessageId::Request,
            Message::Get { .. } => MessageId::Get,
            Message::GetCount { .. } => MessageId::GetCount,
            Message::BecomeSeeder { .. } => MessageId::BecomeSeeder,
            Message::GetHashes { .. } => MessageId::GetHashes,
            Message::Ack => MessageId::Ack,
            Message::Error { .. } => MessageId::Error,
            Message::PeerList { .. } => MessageId::PeerList,
            Message::ChunkData { .. } => MessageId::ChunkData,
            Message::ChunkCount { .. } => MessageId::ChunkCount,
            Message::ChunkHashes { .. } => MessageId::ChunkHashes,
        }
    }

    /// Encodes the message as one unframed record, suitable for a single
    /// datagram. Fields that exceed their wire bounds are rejected here,
    /// mirroring the checks [`Message::decode`] applies on receipt.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_hint());
        buf.put_u8(self.id() as u8);

        match self {
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
                put_string(&mut buf, file_name)?;
                buf.put_u16(*peer_port);
                buf.put_u32(*chunk_count);
            }
            Message::KeepAlive { peer_port } => {
                buf.put_u16(*peer_port);
            }
            Message::Request { file_name }
            | Message::GetCount { file_name }
            | Message::GetHashes { file_name } => {
                put_string(&mut buf, file_name)?;
            }
            Message::Get {
                file_name,
                chunk_index,
            } => {
                put_string(&mut buf, file_name)?;
                buf.put_u32(*chunk_index);
            }
            Message::Ack => {}
            Message::Error { text } => {
                put_string(&mut buf, text)?;
            }
            Message::PeerList { peers } => {
                if peers.len() > MAX_PEER_LIST_LEN {
                    return Err(ProtocolError::SizeExceeded(peers.len()));
                }
                buf.put_u32(peers.len() as u32);
                for peer in peers {
                    peer.encode(&mut buf);
                }
            }
            Message::ChunkData {
                chunk_index,
                digest,
                data,
            } => {
                if data.is_empty() {
                    return Err(ProtocolError::Invalid("empty chunk body".into()));
                }
                if data.len() > MAX_BODY_SIZE {
                    return Err(ProtocolError::SizeExceeded(data.len()));
                }
                buf.put_u32(*chunk_index);
                buf.put_slice(digest);
                buf.put_u32(data.len() as u32);
                buf.put_slice(data);
            }
            Message::ChunkCount { chunk_count } => {
                buf.put_u32(*chunk_count);
            }
            Message::ChunkHashes { digests } => {
                if digests.len() > MAX_CHUNK_HASHES_LEN {
                    return Err(ProtocolError::SizeExceeded(digests.len()));
                }
                buf.put_u32(digests.len() as u32);
                for digest in digests {
                    buf.put_slice(digest);
                }
            }
        }

        Ok(buf.freeze())
    }

    /// Encodes the message with the 4-byte big-endian length prefix used
    /// on stream transports.
    pub fn encode_framed(&self) -> Result<Bytes, ProtocolError> {
        let payload = self.encode()?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::SizeExceeded(payload.len()));
        }
        let mut framed = BytesMut::with_capacity(4 + payload.len());
        framed.put_u32(payload.len() as u32);
        framed.put_slice(&payload);
        Ok(framed.freeze())
    }

    /// Decodes one unframed record, rejecting trailing bytes.
    pub fn decode(mut data: Bytes) -> Result<Self, ProtocolError> {
        let id = MessageId::try_from(get_u8(&mut data)?)?;

        let message = match id {
            MessageId::Register => Message::Register {
                file_name: get_string(&mut data, MAX_FILE_NAME_LEN)?,
                peer_port: get_u16(&mut data)?,
                chunk_count: get_u32(&mut data)?,
            },
            MessageId::KeepAlive => Message::KeepAlive {
                peer_port: get_u16(&mut data)?,
            },
            MessageId::Request => Message::Request {
                file_name: get_string(&mut data, MAX_FILE_NAME_LEN)?,
            },
            MessageId::Get => Message::Get {
                file_name: get_string(&mut data, MAX_FILE_NAME_LEN)?,
                chunk_index: get_u32(&mut data)?,
            },
            MessageId::GetCount => Message::GetCount {
                file_name: get_string(&mut data, MAX_FILE_NAME_LEN)?,
            },
            MessageId::BecomeSeeder => Message::BecomeSeeder {
                file_name: get_string(&mut data, MAX_FILE_NAME_LEN)?,
                peer_port: get_u16(&mut data)?,
                chunk_count: get_u32(&mut data)?,
            },
            MessageId::GetHashes => Message::GetHashes {
                file_name: get_string(&mut data, MAX_FILE_NAME_LEN)?,
            },
            MessageId::Ack => Message::Ack,
            MessageId::Error => Message::Error {
                text: get_string(&mut data, MAX_ERROR_TEXT_LEN)?,
            },
            MessageId::PeerList => {
                let count = get_u32(&mut data)? as usize;
                if count > MAX_PEER_LIST_LEN {
                    return Err(ProtocolError::SizeExceeded(count));
                }
                let mut peers = Vec::with_capacity(count);
                for _ in 0..count {
                    peers.push(PeerEndpoint::decode(&mut data)?);
                }
                Message::PeerList { peers }
            }
            MessageId::ChunkData => {
                let chunk_index = get_u32(&mut data)?;
                let digest: [u8; 32] = get_array(&mut data)?;
                let len = get_u32(&mut data)? as usize;
                if len > MAX_BODY_SIZE {
                    return Err(ProtocolError::SizeExceeded(len));
                }
                if len == 0 {
                    return Err(ProtocolError::Invalid("empty chunk body".into()));
                }
                if data.remaining() < len {
                    return Err(ProtocolError::Truncated);
                }
                Message::ChunkData {
                    chunk_index,
                    digest,
                    data: data.copy_to_bytes(len),
                }
            }
            MessageId::ChunkCount => Message::ChunkCount {
                chunk_count: get_u32(&mut data)?,
            },
            MessageId::ChunkHashes => {
                let count = get_u32(&mut data)? as usize;
                if count > MAX_CHUNK_HASHES_LEN {
                    return Err(ProtocolError::SizeExceeded(count));
                }
                let mut digests = Vec::with_capacity(count);
                for _ in 0..count {
                    digests.push(get_array(&mut data)?);
                }
                Message::ChunkHashes { digests }
            }
        };

        if data.has_remaining() {
            return Err(ProtocolError::TrailingBytes);
        }
        Ok(message)
    }

    fn encoded_hint(&self) -> usize {
        match self {
            Message::ChunkData { data, .. } => 64 + data.len(),
            Message::ChunkHashes { digests } => 8 + digests.len() * 32,
            Message::PeerList { peers } => 8 + peers.len() * 19,
            _ => 64,
        }
    }
}

fn put_string(buf: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    if value.len() > u16::MAX as usize {
        return Err(ProtocolError::SizeExceeded(value.len()));
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn get_u8(buf: &mut Bytes) -> Result<u8, ProtocolError> {
    if buf.remaining() < 1 {
        return Err(ProtocolError::Truncated);
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut Bytes) -> Result<u16, ProtocolError> {
    if buf.remaining() < 2 {
        return Err(ProtocolError::Truncated);
    }
    Ok(buf.get_u16())
}

fn get_u32(buf: &mut Bytes) -> Result<u32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated);
    }
    Ok(buf.get_u32())
}

fn get_array<const N: usize>(buf: &mut Bytes) -> Result<[u8; N], ProtocolError> {
    if buf.remaining() < N {
        return Err(ProtocolError::Truncated);
    }
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn get_string(buf: &mut Bytes, max_len: usize) -> Result<String, ProtocolError> {
    let len = get_u16(buf)? as usize;
    if len > max_len {
        return Err(ProtocolError::SizeExceeded(len));
    }
    if buf.remaining() < len {
        return Err(ProtocolError::Truncated);
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}
