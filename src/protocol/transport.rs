use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::error::ProtocolError;
use super::message::Message;
use crate::constants::MAX_FRAME_SIZE;

/// One stream connection exchanging length-prefixed message frames.
///
/// The swarm's stream protocol is strictly one request frame and one reply
/// frame per connection; the transport itself does not enforce that shape,
/// it only moves whole frames under a deadline.
pub struct FrameTransport {
    stream: TcpStream,
    read_buf: BytesMut,
    deadline: Duration,
}

impl FrameTransport {
    /// Wraps an accepted connection.
    pub fn new(stream: TcpStream, deadline: Duration) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(8 * 1024),
            deadline,
        }
    }

    /// Connects to a peer, bounded by the same deadline used for I/O.
    pub async fn connect(addr: SocketAddr, deadline: Duration) -> Result<Self, ProtocolError> {
        let stream = timeout(deadline, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        Ok(Self::new(stream, deadline))
    }

    /// Sends one framed message.
    pub async fn send(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let frame = message.encode_framed()?;
        timeout(self.deadline, self.stream.write_all(&frame))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        Ok(())
    }

    /// Receives one framed message. EOF before a complete frame is a
    /// [`ProtocolError::ConnectionClosed`] (a short read).
    pub async fn receive(&mut self) -> Result<Message, ProtocolError> {
        self.fill(4).await?;
        let len = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::SizeExceeded(len));
        }

        self.fill(4 + len).await?;
        let mut frame = self.read_buf.split_to(4 + len).freeze();
        frame.advance(4);
        Message::decode(frame)
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    async fn fill(&mut self, wanted: usize) -> Result<(), ProtocolError> {
        while self.read_buf.len() < wanted {
            let n = timeout(self.deadline, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| ProtocolError::Timeout)??;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
        }
        Ok(())
    }
}
