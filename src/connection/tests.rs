//! End-to-end scenarios for the Connection Core, driven through the public
//! `send`/`recv` entry points with a deterministic test cipher standing in
//! for the embedder's real AEAD.

use super::*;
use crate::frame::Frame;
use crate::packet::header::{FOOTER_TAG_LEN, LongHeader, PacketType, ShortHeader};
use crate::packet_number::Width;
use bytes::Bytes;
use s2n_codec::{DecoderBufferMut, EncoderBuffer};
use std::collections::VecDeque;
use std::time::Duration;

/// A reversible stream cipher (plaintext XORed against a key/nonce-derived
/// keystream), standing in for a real AEAD in these tests; not carrying an
/// authentication tag, since none of these scenarios exercise tamper
/// detection.
fn xor_cipher(out: &mut [u8], input: &[u8], key: &[u8], nonce: u64) {
    let nb = nonce.to_le_bytes();
    for (i, b) in input.iter().enumerate() {
        let k = key[i % key.len()] ^ nb[i % nb.len()];
        out[i] = b ^ k;
    }
}

#[derive(Default)]
struct TestCallbacks {
    client_initial: Option<(u64, Bytes)>,
    client_cleartext: VecDeque<Bytes>,
    server_cleartext: VecDeque<Bytes>,
    server_initial_pkt_num: Option<u64>,
    recv_handshake: Vec<Bytes>,
    handshake_completed: bool,
    recv_stream: Vec<(u32, bool, Vec<u8>)>,
}

impl Callbacks for TestCallbacks {
    fn send_client_initial(&mut self) -> Result<(u64, Bytes)> {
        self.client_initial.clone().ok_or(Error::CallbackFailure)
    }

    fn send_client_cleartext(&mut self) -> Result<Bytes> {
        Ok(self.client_cleartext.pop_front().unwrap_or_default())
    }

    fn send_server_cleartext(&mut self, initial: bool, pkt_num: &mut Option<u64>) -> Result<Bytes> {
        if initial {
            *pkt_num = self.server_initial_pkt_num;
        }
        Ok(self.server_cleartext.pop_front().unwrap_or_default())
    }

    fn recv_handshake_data(&mut self, data: &[u8]) -> Result<()> {
        self.recv_handshake.push(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn handshake_completed(&mut self) -> Result<()> {
        self.handshake_completed = true;
        Ok(())
    }

    fn encrypt(&mut self, out: &mut [u8], plaintext: &[u8], key: &[u8], nonce: u64, _aad: &[u8]) -> Result<usize> {
        xor_cipher(out, plaintext, key, nonce);
        Ok(plaintext.len())
    }

    fn decrypt(&mut self, out: &mut [u8], ciphertext: &[u8], key: &[u8], nonce: u64, _aad: &[u8]) -> Result<usize> {
        xor_cipher(out, ciphertext, key, nonce);
        Ok(ciphertext.len())
    }

    fn recv_stream_data(&mut self, stream_id: u32, fin: bool, data: &[u8]) -> Result<()> {
        self.recv_stream.push((stream_id, fin, data.to_vec()));
        Ok(())
    }
}

const TEST_KEY: &[u8] = b"0123456789abcdef";

fn short_header_len() -> usize {
    ShortHeader {
        conn_id: 1,
        width: Width::Bits32,
        truncated_packet_number: 0,
    }
    .encoded_len()
}

/// Builds and "seals" (xor-ciphers) one protected packet carrying `frames`,
/// mirroring what a peer's assembler would produce.
fn build_protected_packet(conn_id: u64, pkt_num: u64, frames: &[Frame]) -> Vec<u8> {
    let header = ShortHeader {
        conn_id,
        width: Width::Bits32,
        truncated_packet_number: Width::Bits32.truncate(pkt_num),
    };
    let mut header_buf = vec![0u8; header.encoded_len()];
    let mut henc = EncoderBuffer::new(&mut header_buf);
    header.encode(&mut henc).unwrap();

    let mut plaintext = vec![0u8; 2048];
    let mut penc = EncoderBuffer::new(&mut plaintext);
    for f in frames {
        f.encode(&mut penc).unwrap();
    }
    let plaintext_len = penc.len();

    let mut packet = vec![0u8; header_buf.len() + plaintext_len];
    packet[..header_buf.len()].copy_from_slice(&header_buf);
    xor_cipher(&mut packet[header_buf.len()..], &plaintext[..plaintext_len], TEST_KEY, pkt_num);
    packet
}

fn post_handshake_client(local: Settings, remote: Settings) -> Connection<TestCallbacks> {
    let mut conn = Connection::new_client(1, 1, local, remote, TestCallbacks::default());
    conn.state = State::PostHandshake;
    conn.tx_keys = Some(Keys::new(Bytes::copy_from_slice(TEST_KEY), 0));
    conn.rx_keys = Some(Keys::new(Bytes::copy_from_slice(TEST_KEY), 0));
    conn
}

fn post_handshake_server(local: Settings, remote: Settings) -> Connection<TestCallbacks> {
    let mut conn = Connection::new_server(1, 1, local, remote, TestCallbacks::default());
    conn.state = State::PostHandshake;
    conn.tx_keys = Some(Keys::new(Bytes::copy_from_slice(TEST_KEY), 0));
    conn.rx_keys = Some(Keys::new(Bytes::copy_from_slice(TEST_KEY), 0));
    conn
}

/// Scenario 1: client handshake skeleton.
#[test]
fn client_handshake_skeleton() {
    let local = Settings::new(1, 8192, 4096);
    let remote = Settings::new(1, 8192, 4096);
    let cb = TestCallbacks {
        client_initial: Some((100, Bytes::from_static(b"HELLO"))),
        ..Default::default()
    };
    let mut conn = Connection::new_client(1, 1, local, remote, cb);

    let mut out = [0u8; 1500];
    let n = conn.send(&mut out, Duration::from_millis(0)).unwrap();

    assert_eq!(n, 1200);
    assert_eq!(conn.state(), State::ClientWaitHandshake);

    let (hd, rest) = LongHeader::decode(DecoderBufferMut::new(&mut out[..n - FOOTER_TAG_LEN])).unwrap();
    assert_eq!(hd.packet_type, PacketType::ClientInitial);
    assert_eq!(hd.packet_number, 100);

    let (frame, _) = Frame::decode(rest).unwrap();
    match frame {
        Frame::Stream(s) => {
            assert_eq!(s.stream_id, 0);
            assert_eq!(s.offset, 0);
            assert!(!s.fin);
            assert_eq!(&s.data[..], b"HELLO");
        }
        other => panic!("expected a stream frame, got {other:?}"),
    }

    assert_eq!(conn.rtb.len(), 1);
    let entry = conn.rtb.top().unwrap();
    assert_eq!(entry.pkt_num, 100);
    assert_eq!(entry.expiry, Duration::from_millis(0) + crate::rtb::INITIAL_EXPIRY);
    assert_eq!(entry.kind, crate::rtb::RtbPacketKind::ClientInitial);
}

/// Scenario 2: delayed ack coalescing.
#[test]
fn delayed_ack_coalesces_consecutive_run() {
    let local = Settings::new(1, 8192, 4096);
    let remote = Settings::new(1, 8192, 4096);
    let mut conn = post_handshake_client(local, remote);

    let t0 = Duration::from_millis(0);
    conn.ack_tracker.add(10, t0);
    conn.ack_tracker.add(11, t0 + Duration::from_millis(1));
    conn.ack_tracker.add(12, t0 + Duration::from_millis(2));

    let due = t0 + crate::ack_tracker::DELAYED_ACK_TIMEOUT + Duration::from_millis(1);
    let mut out = [0u8; 1500];
    let n = conn.send(&mut out, due).unwrap();
    assert!(n > 0);
    assert!(conn.ack_tracker.is_empty());

    let header_len = short_header_len();
    let mut plain = vec![0u8; n - header_len];
    xor_cipher(&mut plain, &out[header_len..n], TEST_KEY, 0);
    let (frame, _) = Frame::decode(DecoderBufferMut::new(&mut plain)).unwrap();
    match frame {
        Frame::Ack(ack) => {
            assert_eq!(ack.largest_ack, 12);
            assert_eq!(ack.first_ack_blklen, 2);
            assert!(ack.blocks.is_empty());
        }
        other => panic!("expected an ack frame, got {other:?}"),
    }
}

/// Scenario 3: reordered stream delivery.
#[test]
fn reordered_stream_delivery_reassembles_in_order() {
    let local = Settings::new(10, 8192, 4096);
    let remote = Settings::new(10, 8192, 4096);
    let mut conn = post_handshake_server(local, remote);

    let mut p0 = build_protected_packet(
        1,
        0,
        &[Frame::Stream(crate::frame::Stream {
            stream_id: 3,
            offset: 4,
            fin: false,
            data: Bytes::from_static(b"defg"),
        })],
    );
    conn.recv(&mut p0, Duration::from_millis(0)).unwrap();
    assert!(conn.callbacks.recv_stream.is_empty());

    let mut p1 = build_protected_packet(
        1,
        1,
        &[Frame::Stream(crate::frame::Stream {
            stream_id: 3,
            offset: 0,
            fin: false,
            data: Bytes::from_static(b"abcd"),
        })],
    );
    conn.recv(&mut p1, Duration::from_millis(0)).unwrap();

    assert_eq!(conn.callbacks.recv_stream.len(), 2);
    assert_eq!(conn.callbacks.recv_stream[0], (3, false, b"abcd".to_vec()));
    assert_eq!(conn.callbacks.recv_stream[1], (3, false, b"defg".to_vec()));
    assert_eq!(conn.registry.find(3).unwrap().rx_offset(), 8);
}

/// Scenario 4: flow-control violation.
#[test]
fn flow_control_violation_is_rejected_without_delivery() {
    let local = Settings::new(10, 8192, 4096);
    let remote = Settings::new(10, 8192, 4096);
    let mut conn = post_handshake_server(local, remote);

    conn.registry.admit_peer_stream(3, 4096, 4096).unwrap();
    conn.registry.find_mut(3).unwrap().max_rx_offset = 1024;

    let mut pkt = build_protected_packet(
        1,
        0,
        &[Frame::Stream(crate::frame::Stream {
            stream_id: 3,
            offset: 1020,
            fin: false,
            data: Bytes::from_static(b"12345678"),
        })],
    );
    let err = conn.recv(&mut pkt, Duration::from_millis(0)).unwrap_err();
    assert_eq!(err, Error::FlowControl);
    assert!(conn.callbacks.recv_stream.is_empty());
    assert_eq!(conn.registry.find(3).unwrap().last_rx_offset, 0);
    assert_eq!(conn.rx_offset.as_u64(), 0);
}

/// Scenario 5: retransmission split.
#[test]
fn retransmission_splits_what_fits_and_leaves_the_rest() {
    let local = Settings::new(1, 8192, 4096);
    let remote = Settings::new(1, 8192, 4096);
    let mut conn = post_handshake_client(local, remote);

    let make_frame = |offset: u64| {
        Frame::Stream(crate::frame::Stream {
            stream_id: 1,
            offset,
            fin: false,
            data: Bytes::from(vec![0xab; 883]), // 883 + STREAM_OVERHEAD(17) == 900
        })
    };
    let frames = vec![make_frame(0), make_frame(883), make_frame(1766)];
    let original_expiry = Duration::from_millis(100);
    conn.rtb.add(crate::rtb::RtbEntry {
        pkt_num: 5,
        expiry: original_expiry,
        frames,
        kind: crate::rtb::RtbPacketKind::Protected,
    });

    let mut out = [0u8; 1200];
    let now = Duration::from_millis(200);
    let n = conn.send(&mut out, now).unwrap();
    assert!(n > 0);
    assert_eq!(conn.rtb.len(), 2);

    let first = conn.rtb.pop().unwrap();
    assert_eq!(first.pkt_num, 5);
    assert_eq!(first.expiry, original_expiry);
    assert_eq!(first.frames.len(), 2);

    let second = conn.rtb.pop().unwrap();
    assert_eq!(second.expiry, now + crate::rtb::INITIAL_EXPIRY);
    assert_eq!(second.frames.len(), 1);
}

/// Scenario 6: MAX_STREAM_DATA trigger.
#[test]
fn extending_stream_offset_past_half_triggers_max_stream_data() {
    let local = Settings::new(10, 8192, 4096);
    let remote = Settings::new(10, 8192, 4096);
    let mut conn = post_handshake_client(local, remote);
    conn.open_stream(1).unwrap();

    conn.extend_max_stream_offset(1, 2049).unwrap();
    assert!(conn.registry.find(1).unwrap().fc_pending);

    let mut out = [0u8; 1500];
    let n = conn.send(&mut out, Duration::from_millis(0)).unwrap();
    assert!(n > 0);

    let header_len = short_header_len();
    let mut plain = vec![0u8; n - header_len];
    xor_cipher(&mut plain, &out[header_len..n], TEST_KEY, 0);
    let (frame, _) = Frame::decode(DecoderBufferMut::new(&mut plain)).unwrap();
    match frame {
        Frame::MaxStreamData(f) => {
            assert_eq!(f.stream_id, 1);
            assert_eq!(f.max_stream_data, 4096 + 2049);
        }
        other => panic!("expected a max_stream_data frame, got {other:?}"),
    }

    let strm = conn.registry.find(1).unwrap();
    assert_eq!(strm.max_rx_offset, 4096 + 2049);
    assert!(!strm.fc_pending);
}
