use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use super::error::TrackerError;
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::protocol::{Message, PeerEndpoint};

/// Client side of the tracker protocol: one datagram socket, one
/// request/response exchange at a time.
///
/// There is no retransmission layer; a lost datagram surfaces as
/// [`TrackerError::Timeout`] and the caller resends. Methods take `&mut
/// self` so concurrent activities cannot interleave replies on one
/// socket; each activity owns its own client.
pub struct TrackerClient {
    socket: UdpSocket,
    reply_timeout: Duration,
}

impl TrackerClient {
    /// Binds an ephemeral local socket directed at the tracker.
    pub async fn connect(
        tracker_addr: SocketAddr,
        reply_timeout: Duration,
    ) -> Result<Self, TrackerError> {
        let socket = if tracker_addr.is_ipv4() {
            UdpSocket::bind("0.0.0.0:0").await?
        } else {
            UdpSocket::bind("[::]:0").await?
        };
        socket.connect(tracker_addr).await?;
        Ok(Self {
            socket,
            reply_timeout,
        })
    }

    /// Announces a hosted file. The tracker either acknowledges or
    /// rejects (chunk-count conflict).
    pub async fn register(
        &mut self,
        file_name: &str,
        peer_port: u16,
        chunk_count: u32,
    ) -> Result<(), TrackerError> {
        let request = Message::Register {
            file_name: file_name.to_string(),
            peer_port,
            chunk_count,
        };
        self.expect_ack(&request).await
    }

    /// Announces a file this peer just finished downloading.
    pub async fn become_seeder(
        &mut self,
        file_name: &str,
        peer_port: u16,
        chunk_count: u32,
    ) -> Result<(), TrackerError> {
        let request = Message::BecomeSeeder {
            file_name: file_name.to_string(),
            peer_port,
            chunk_count,
        };
        self.expect_ack(&request).await
    }

    /// Sends a liveness beacon. Best effort: the tracker only answers
    /// beacons from known endpoints, so a missing reply is not an error.
    pub async fn keepalive(&mut self, peer_port: u16) -> Result<(), TrackerError> {
        let request = Message::KeepAlive { peer_port };
        match self.exchange(&request).await {
            Ok(Message::Ack) => Ok(()),
            Ok(other) => {
                debug!(kind = ?other.id(), "ignoring unexpected keepalive reply");
                Ok(())
            }
            Err(TrackerError::Timeout) => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Current live seeder set for a file. An empty list is a valid
    /// answer, including for files the tracker has never seen.
    pub async fn request_peers(
        &mut self,
        file_name: &str,
    ) -> Result<Vec<PeerEndpoint>, TrackerError> {
        let request = Message::Request {
            file_name: file_name.to_string(),
        };
        match self.exchange(&request).await? {
            Message::PeerList { peers } => Ok(peers),
            Message::Error { text } => Err(TrackerError::Rejected(text)),
            _ => Err(TrackerError::UnexpectedResponse("expected PeerList")),
        }
    }

    /// Authoritative chunk count for a file.
    pub async fn chunk_count(&mut self, file_name: &str) -> Result<u32, TrackerError> {
        let request = Message::GetCount {
            file_name: file_name.to_string(),
        };
        match self.exchange(&request).await? {
            Message::ChunkCount { chunk_count } => Ok(chunk_count),
            Message::Error { text } => Err(TrackerError::Rejected(text)),
            _ => Err(TrackerError::UnexpectedResponse("expected ChunkCount")),
        }
    }

    async fn expect_ack(&mut self, request: &Message) -> Result<(), TrackerError> {
        match self.exchange(request).await? {
            Message::Ack => Ok(()),
            Message::Error { text } => Err(TrackerError::Rejected(text)),
            _ => Err(TrackerError::UnexpectedResponse("expected Ack")),
        }
    }

    async fn exchange(&mut self, request: &Message) -> Result<Message, TrackerError> {
        self.socket.send(&request.encode()?).await?;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let len = timeout(self.reply_timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| TrackerError::Timeout)??;
        Ok(Message::decode(Bytes::copy_from_slice(&buf[..len]))?)
    }
}
