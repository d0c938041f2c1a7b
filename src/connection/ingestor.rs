//! Packet Ingestor: header parsing, AEAD-open, and frame dispatch on
//! receipt (§4.5).

use super::{Callbacks, Connection, State};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::packet::header::{footer_tag, LongHeader, PacketType, ShortHeader, FOOTER_TAG_LEN};
use crate::packet_number;
use crate::registry::{conn_local_stream, Role};
use crate::stream::ShutdownFlags;
use bytes::Bytes;
use s2n_codec::DecoderBufferMut;
use std::time::Duration;

impl<C: Callbacks> Connection<C> {
    /// Ingests one datagram (§6: `recv`).
    #[tracing::instrument(level = "trace", skip(self, bytes))]
    pub fn recv(&mut self, bytes: &mut [u8], now: Duration) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::Proto);
        }
        if bytes[0] & 0x80 != 0 {
            self.recv_long(bytes, now)
        } else {
            self.recv_short(bytes, now)
        }
    }

    fn recv_long(&mut self, bytes: &mut [u8], now: Duration) -> Result<()> {
        if bytes.len() < FOOTER_TAG_LEN {
            return Err(Error::Proto);
        }
        let body_len = bytes.len() - FOOTER_TAG_LEN;
        let tag = footer_tag(&bytes[..body_len]);
        if &bytes[body_len..] != &tag[..] {
            return Err(Error::BadPacketHash);
        }

        let (hd, payload_buf) = LongHeader::decode(DecoderBufferMut::new(&mut bytes[..body_len]))?;

        if self.role == Role::Client && hd.packet_type == PacketType::ServerCleartext {
            self.conn_id = hd.conn_id;
        }

        let pkt_num = hd.packet_number as u64;
        self.dispatch_handshake_frames(payload_buf, pkt_num, now)?;
        self.max_rx_pkt_num = self.max_rx_pkt_num.max(pkt_num);
        Ok(())
    }

    fn dispatch_handshake_frames(
        &mut self,
        mut buffer: DecoderBufferMut,
        pkt_num: u64,
        now: Duration,
    ) -> Result<()> {
        self.callbacks.recv_pkt(pkt_num);
        let mut ack_worthy = false;
        while !buffer.is_empty() {
            let (frame, rest) = Frame::decode(buffer)?;
            self.callbacks.recv_frame(pkt_num, &frame);
            match &frame {
                Frame::Ack(ack) => {
                    ack.validate_monotonic()?;
                    self.rtb.recv_ack(ack);
                }
                Frame::Stream(s) if s.stream_id == 0 => {
                    ack_worthy = true;
                    if s.data.is_empty() {
                        tracing::trace!("ignoring zero-length stream-0 frame during handshake");
                    } else {
                        self.callbacks.recv_handshake_data(&s.data)?;
                    }
                    if s.fin {
                        self.note_handshake_fin(now)?;
                    }
                }
                Frame::ConnectionClose { .. } => {}
                _ => ack_worthy = true,
            }
            buffer = rest;
        }
        if ack_worthy {
            self.ack_tracker.add(pkt_num, now);
        }
        Ok(())
    }

    fn note_handshake_fin(&mut self, now: Duration) -> Result<()> {
        match (self.role, self.state) {
            (Role::Client, State::ClientWaitHandshake) => {
                self.state = State::ClientHandshakeAlmostFinished;
            }
            (Role::Server, State::ServerWaitHandshake) => {
                self.complete_handshake(now)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Invokes the handshake-completed callback, replays any protected
    /// packets buffered while the handshake was in progress, then advances
    /// to `POST_HANDSHAKE` (§4.6).
    pub(crate) fn complete_handshake(&mut self, now: Duration) -> Result<()> {
        self.callbacks.handshake_completed()?;
        let buffered: Vec<Bytes> = self.buffered_rx_packets.drain(..).collect();
        for pkt in buffered {
            let mut owned = pkt.to_vec();
            self.recv_protected(&mut owned, now)?;
        }
        self.state = State::PostHandshake;
        Ok(())
    }

    fn recv_short(&mut self, bytes: &mut [u8], now: Duration) -> Result<()> {
        if self.state.is_handshake() {
            if self.buffered_rx_packets.len() >= super::MAX_BUFFERED_RX_PACKETS {
                tracing::trace!("dropping protected packet received during handshake: buffer full");
                return Ok(());
            }
            self.buffered_rx_packets.push_back(Bytes::copy_from_slice(bytes));
            return Ok(());
        }
        self.recv_protected(bytes, now)
    }

    fn recv_protected(&mut self, bytes: &mut [u8], now: Duration) -> Result<()> {
        let mut head_copy = bytes.to_vec();
        let (hd, _) = ShortHeader::decode(DecoderBufferMut::new(&mut head_copy))?;
        let header_len = hd.encoded_len();
        if bytes.len() < header_len {
            return Err(Error::Proto);
        }
        let pkt_num = packet_number::adjust(self.max_rx_pkt_num, hd.truncated_packet_number, hd.width);

        let (header_bytes, ciphertext) = bytes.split_at_mut(header_len);
        let rx_keys = self.rx_keys.clone().ok_or(Error::InvalidState)?;
        let nonce = rx_keys.nonce(pkt_num);
        let ciphertext_buf = ciphertext.to_vec();
        let plain_len = self
            .callbacks
            .decrypt(ciphertext, &ciphertext_buf, &rx_keys.key, nonce, header_bytes)?;

        self.callbacks.recv_pkt(pkt_num);

        let mut buffer = DecoderBufferMut::new(&mut ciphertext[..plain_len]);
        let mut ack_worthy = false;
        while !buffer.is_empty() {
            let (frame, rest) = Frame::decode(buffer)?;
            self.callbacks.recv_frame(pkt_num, &frame);
            if !matches!(frame, Frame::Ack(_) | Frame::ConnectionClose { .. }) {
                ack_worthy = true;
            }
            match frame {
                Frame::Ack(ref ack) => {
                    ack.validate_monotonic()?;
                    self.rtb.recv_ack(ack);
                }
                Frame::Stream(s) if s.stream_id == 0 => {
                    if !s.data.is_empty() {
                        self.callbacks.recv_handshake_data(&s.data)?;
                    }
                    if s.fin {
                        self.note_handshake_fin(now)?;
                    }
                }
                Frame::Stream(s) => {
                    self.recv_stream_frame(s)?;
                }
                Frame::MaxStreamData(f) => {
                    if let Some(strm) = self.registry.find_mut(f.stream_id) {
                        strm.max_tx_offset = strm.max_tx_offset.max(f.max_stream_data);
                    }
                }
                Frame::MaxData(f) => {
                    self.max_tx_offset_high = self.max_tx_offset_high.max(f.max_data);
                }
                // MAX_STREAM_ID and CONNECTION_CLOSE are surfaced to the
                // embedder via recv_frame above and otherwise ignored by
                // the core (§4.5 step 3, "Others").
                Frame::MaxStreamId(_) | Frame::ConnectionClose { .. } => {}
            }
            buffer = rest;
        }

        self.max_rx_pkt_num = self.max_rx_pkt_num.max(pkt_num);
        if ack_worthy {
            self.ack_tracker.add(pkt_num, now);
        }
        Ok(())
    }

    fn recv_stream_frame(&mut self, fr: crate::frame::Stream) -> Result<()> {
        let fr_end = fr
            .offset
            .checked_add(fr.data.len() as u64)
            .ok_or(Error::Proto)?;

        let peer_initiated = !conn_local_stream(self.role, fr.stream_id);
        if peer_initiated && fr.stream_id > self.local_settings.max_stream_id {
            return Err(Error::Proto);
        }

        if self.registry.find(fr.stream_id).is_none() {
            if !peer_initiated {
                return Err(Error::Proto);
            }
            let admitted = self.registry.admit_peer_stream(
                fr.stream_id,
                self.local_settings.max_stream_data,
                self.remote_settings.max_stream_data,
            )?;
            if admitted.is_none() {
                tracing::trace!(stream_id = fr.stream_id, "ignoring frame for a closed peer stream");
                return Ok(());
            }
        }

        let (max_rx_offset, last_rx_offset) = {
            let strm = self.registry.find(fr.stream_id).expect("admitted above");
            (strm.max_rx_offset, strm.last_rx_offset)
        };
        if fr_end > max_rx_offset {
            return Err(Error::FlowControl);
        }

        if fr_end > last_rx_offset {
            let new = fr_end - last_rx_offset;
            if self.rx_offset.would_violate(new, self.max_rx_offset.high) {
                return Err(Error::FlowControl);
            }
            self.rx_offset.increment(new);
            let strm = self.registry.find_mut(fr.stream_id).expect("checked above");
            strm.last_rx_offset = fr_end;
        }

        if fr.fin {
            let strm = self.registry.find_mut(fr.stream_id).expect("checked above");
            strm.shutdown(ShutdownFlags::SHUT_RD);
            if fr_end != strm.last_rx_offset {
                return Err(Error::Proto);
            }
        }

        let rx_offset = self.registry.find(fr.stream_id).expect("checked above").rx_offset();
        if fr.offset <= rx_offset {
            let strm = self.registry.find_mut(fr.stream_id).expect("checked above");
            let delivered = strm.deliver_and_drain(fr.offset, fr.data);
            let final_fin =
                strm.shutdown.contains(ShutdownFlags::SHUT_RD) && strm.rx_offset() == strm.last_rx_offset;
            let last = delivered.len().saturating_sub(1);
            for (i, chunk) in delivered.iter().enumerate() {
                self.callbacks
                    .recv_stream_data(fr.stream_id, i == last && final_fin, chunk)?;
            }
        } else {
            let strm = self.registry.find_mut(fr.stream_id).expect("checked above");
            strm.recv_reordered(fr.offset, fr.data)?;
        }

        let strm = self.registry.find_mut(fr.stream_id).expect("checked above");
        if strm.is_closed() && strm.ready_to_destroy() {
            self.close_stream(fr.stream_id);
        }

        Ok(())
    }
}
