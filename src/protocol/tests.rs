use super::*;
use bytes::{BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tokio::net::TcpListener;

use crate::constants::{MAX_BODY_SIZE, MAX_FRAME_SIZE};

fn sample_messages() -> Vec<Message> {
    vec![
        Message::Register {
            file_name: "hello.bin".into(),
            peer_port: 40123,
            chunk_count: 3,
        },
        Message::KeepAlive { peer_port: 40123 },
        Message::Request {
            file_name: "hello.bin".into(),
        },
        Message::Get {
            file_name: "hello.bin".into(),
            chunk_index: 2,
        },
        Message::GetCount {
            file_name: "hello.bin".into(),
        },
        Message::BecomeSeeder {
            file_name: "hello.bin".into(),
            peer_port: 40999,
            chunk_count: 3,
        },
        Message::GetHashes {
            file_name: "hello.bin".into(),
        },
        Message::Ack,
        Message::Error {
            text: "unknown file: ghost.bin".into(),
        },
        Message::PeerList {
            peers: vec![
                PeerEndpoint::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)), 6881),
                PeerEndpoint::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 40123),
            ],
        },
        Message::PeerList { peers: vec![] },
        Message::ChunkData {
            chunk_index: 1,
            digest: [0xab; 32],
            data: Bytes::from_static(b"chunk payload"),
        },
        Message::ChunkCount { chunk_count: 17 },
        Message::ChunkHashes {
            digests: vec![[1u8; 32], [2u8; 32], [3u8; 32]],
        },
    ]
}

#[test]
fn round_trip_all_variants() {
    for message in sample_messages() {
        let encoded = message.encode().unwrap();
        let decoded = Message::decode(encoded).unwrap();
        assert_eq!(message, decoded);
    }
}

#[test]
fn framed_round_trip() {
    for message in sample_messages() {
        let framed = message.encode_framed().unwrap();
        let len =
            u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
        assert_eq!(len + 4, framed.len());
        let decoded = Message::decode(framed.slice(4..)).unwrap();
        assert_eq!(message, decoded);
    }
}

#[test]
fn truncation_is_rejected() {
    for message in sample_messages() {
        let encoded = message.encode().unwrap();
        // Every proper prefix must fail to decode, never panic.
        for cut in 0..encoded.len() {
            assert!(
                Message::decode(encoded.slice(..cut)).is_err(),
                "prefix of {:?} decoded",
                message.id()
            );
        }
    }
}

#[test]
fn unknown_kind_is_rejected() {
    let data = Bytes::from_static(&[0x7f, 0, 0]);
    assert!(matches!(
        Message::decode(data),
        Err(ProtocolError::UnknownKind(0x7f))
    ));
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut encoded = BytesMut::from(&Message::Ack.encode().unwrap()[..]);
    encoded.put_u8(0);
    assert!(matches!(
        Message::decode(encoded.freeze()),
        Err(ProtocolError::TrailingBytes)
    ));
}

#[test]
fn oversized_chunk_body_is_rejected() {
    // Hand-build a ChunkData record claiming a body beyond the cap.
    let mut raw = BytesMut::new();
    raw.put_u8(MessageId::ChunkData as u8);
    raw.put_u32(0);
    raw.put_slice(&[0u8; 32]);
    raw.put_u32(MAX_BODY_SIZE as u32 + 1);
    assert!(matches!(
        Message::decode(raw.freeze()),
        Err(ProtocolError::SizeExceeded(_))
    ));
}

#[test]
fn empty_chunk_body_is_rejected() {
    let mut raw = BytesMut::new();
    raw.put_u8(MessageId::ChunkData as u8);
    raw.put_u32(0);
    raw.put_slice(&[0u8; 32]);
    raw.put_u32(0);
    assert!(matches!(
        Message::decode(raw.freeze()),
        Err(ProtocolError::Invalid(_))
    ));
}

#[test]
fn non_utf8_name_is_rejected() {
    let mut raw = BytesMut::new();
    raw.put_u8(MessageId::Request as u8);
    raw.put_u16(2);
    raw.put_slice(&[0xff, 0xfe]);
    assert!(matches!(
        Message::decode(raw.freeze()),
        Err(ProtocolError::InvalidUtf8)
    ));
}

#[test]
fn oversized_frame_is_rejected_on_encode() {
    let message = Message::ChunkData {
        chunk_index: 0,
        digest: [0; 32],
        data: Bytes::from(vec![0u8; MAX_FRAME_SIZE + 1]),
    };
    assert!(matches!(
        message.encode_framed(),
        Err(ProtocolError::SizeExceeded(_))
    ));
}

#[test]
fn oversized_fields_are_rejected_on_encode() {
    // A string field longer than its u16 length prefix can carry must
    // fail instead of silently truncating on the wire.
    let message = Message::Error {
        text: "x".repeat(u16::MAX as usize + 1),
    };
    assert!(matches!(
        message.encode(),
        Err(ProtocolError::SizeExceeded(_))
    ));

    let message = Message::ChunkHashes {
        digests: vec![[0u8; 32]; crate::constants::MAX_CHUNK_HASHES_LEN + 1],
    };
    assert!(matches!(
        message.encode(),
        Err(ProtocolError::SizeExceeded(_))
    ));
}

#[test]
fn command_control_split() {
    assert!(MessageId::Get.is_command());
    assert!(MessageId::BecomeSeeder.is_command());
    assert!(!MessageId::Ack.is_command());
    assert!(!MessageId::ChunkData.is_command());
}

#[tokio::test]
async fn transport_exchanges_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let deadline = Duration::from_secs(5);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = FrameTransport::new(stream, deadline);
        let request = transport.receive().await.unwrap();
        assert!(matches!(request, Message::Get { chunk_index: 4, .. }));
        transport
            .send(&Message::ChunkData {
                chunk_index: 4,
                digest: [7; 32],
                data: Bytes::from_static(b"payload"),
            })
            .await
            .unwrap();
    });

    let mut transport = FrameTransport::connect(addr, deadline).await.unwrap();
    transport
        .send(&Message::Get {
            file_name: "a.bin".into(),
            chunk_index: 4,
        })
        .await
        .unwrap();
    let reply = transport.receive().await.unwrap();
    match reply {
        Message::ChunkData {
            chunk_index, data, ..
        } => {
            assert_eq!(chunk_index, 4);
            assert_eq!(&data[..], b"payload");
        }
        other => panic!("unexpected reply: {:?}", other.id()),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn transport_reports_short_read() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        let (mut stream, _) = listener.accept().await.unwrap();
        // Length prefix promising more bytes than will ever arrive.
        stream.write_all(&100u32.to_be_bytes()).await.unwrap();
        stream.write_all(b"abc").await.unwrap();
    });

    let mut transport = FrameTransport::connect(addr, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(matches!(
        transport.receive().await,
        Err(ProtocolError::ConnectionClosed)
    ));
    server.await.unwrap();
}

#[tokio::test]
async fn transport_times_out_on_silence() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut transport = FrameTransport::connect(addr, Duration::from_millis(100))
        .await
        .unwrap();
    assert!(matches!(
        transport.receive().await,
        Err(ProtocolError::Timeout)
    ));
    // Keep the listener alive until the assertion has run.
    drop(listener);
}
