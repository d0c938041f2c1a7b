//! Packet Assembler: builds one outgoing packet under size and
//! flow-control constraints (§4.4).

use super::{Callbacks, Connection, State};
use crate::error::{Error, Result};
use crate::frame::{self, Frame, MaxData, MaxStreamData, MaxStreamId};
use crate::packet::header::{footer_tag, LongHeader, PacketType, ShortHeader, FOOTER_TAG_LEN};
use crate::packet_number::Width;
use crate::rtb::{RtbEntry, RtbPacketKind, INITIAL_EXPIRY};
use s2n_codec::{Encoder, EncoderBuffer};
use std::time::Duration;

/// Minimum datagram size a `CLIENT_INITIAL` packet is padded up to (§4.4).
const MIN_CLIENT_INITIAL_LEN: usize = 1200;

/// How many bytes of STREAM-frame payload fit in `left` bytes of remaining
/// packet space, or `None` if a frame isn't worth attempting at all. Shared
/// between the frame-queue drain and `write_stream` (§9.1).
fn stream_payload_budget(left: usize) -> Option<usize> {
    left.checked_sub(crate::frame::STREAM_OVERHEAD)
        .filter(|&n| n > 0)
}

impl<C: Callbacks> Connection<C> {
    /// Produces one datagram. Returns the number of bytes written, `0` if
    /// there was nothing to send, or an error (§6: `send`).
    #[tracing::instrument(level = "trace", skip(self, out))]
    pub fn send(&mut self, out: &mut [u8], now: Duration) -> Result<usize> {
        if let Some(n) = self.try_retransmit(out, now)? {
            return Ok(n);
        }
        match self.state {
            State::ClientInitial => self.send_client_initial(out, now),
            State::ClientWaitHandshake | State::ClientHandshakeAlmostFinished => {
                self.send_client_cleartext(out)
            }
            State::ServerInitial => self.send_server_cleartext(out, true),
            State::ServerWaitHandshake => self.send_server_cleartext(out, false),
            State::PostHandshake | State::CloseWait => self.send_protected(out, now),
        }
    }

    fn is_stale_frame(&self, frame: &Frame) -> bool {
        match frame {
            Frame::MaxStreamData(f) => self
                .registry
                .find(f.stream_id)
                .map(|s| f.max_stream_data < s.max_rx_offset)
                .unwrap_or(true),
            Frame::MaxData(f) => f.max_data < self.max_rx_offset.high,
            Frame::MaxStreamId(f) => f.max_stream_id < self.registry.local_max_stream_id,
            _ => false,
        }
    }

    /// Pops the earliest-expired RTB entry (if any) and re-encodes its
    /// non-stale frames into a fresh protected packet (§4.6). Frames that
    /// don't fit are left in a re-pushed entry carrying the original
    /// expiry, so the next `send()` retries them immediately rather than
    /// losing them (a deliberate reading of §4.4 step 5 / §9.1's
    /// retransmission notes, recorded in DESIGN.md).
    fn try_retransmit(&mut self, out: &mut [u8], now: Duration) -> Result<Option<usize>> {
        let due = matches!(self.rtb.top(), Some(entry) if entry.expiry <= now);
        if !due {
            return Ok(None);
        }
        let mut entry = self.rtb.pop().expect("checked due above");
        entry.frames.retain(|f| !self.is_stale_frame(f));
        if entry.frames.is_empty() {
            return Ok(None);
        }

        match entry.kind {
            RtbPacketKind::Protected => self.retransmit_protected(entry, out, now),
            RtbPacketKind::ClientInitial => self.retransmit_client_initial(entry, out, now),
        }
    }

    /// Re-seals an expired entry's non-stale frames into a fresh protected
    /// packet.
    fn retransmit_protected(&mut self, mut entry: RtbEntry, out: &mut [u8], now: Duration) -> Result<Option<usize>> {
        let pkt_num = self.take_pkt_num();
        let width = Width::Bits32;
        let header = ShortHeader {
            conn_id: self.conn_id,
            width,
            truncated_packet_number: width.truncate(pkt_num),
        };

        let mut header_buf = vec![0u8; header.encoded_len()];
        let mut henc = EncoderBuffer::new(&mut header_buf);
        header.encode(&mut henc)?;

        let mut plaintext = vec![0u8; out.len()];
        let mut penc = EncoderBuffer::new(&mut plaintext);
        let mut packed = 0;
        for f in &entry.frames {
            if penc.remaining_capacity() < f.encoding_size() {
                break;
            }
            f.encode(&mut penc)?;
            packed += 1;
        }
        if packed == 0 {
            // Doesn't fit at all right now; re-push untouched and signal NOBUF.
            self.rtb.add(entry);
            return Err(Error::NoBuf);
        }
        let leftover: Vec<Frame> = entry.frames.split_off(packed);
        let sent_frames = entry.frames;

        let plaintext_len = penc.len();
        let sealed_len = self.seal(&header_buf, &mut plaintext[..plaintext_len], out, header.encoded_len())?;

        if !leftover.is_empty() {
            self.rtb.add(RtbEntry {
                pkt_num: entry.pkt_num,
                expiry: entry.expiry,
                frames: leftover,
                kind: RtbPacketKind::Protected,
            });
        }
        self.rtb.add(RtbEntry {
            pkt_num,
            expiry: now + INITIAL_EXPIRY,
            frames: sent_frames,
            kind: RtbPacketKind::Protected,
        });

        self.callbacks.send_pkt(pkt_num);
        Ok(Some(header.encoded_len() + sealed_len))
    }

    /// Re-emits an expired `CLIENT_INITIAL` as another unprotected,
    /// padded `CLIENT_INITIAL` (§4.4 step 6): there are no tx keys yet to
    /// seal a short-header packet with, so this mirrors
    /// `send_client_initial`'s cleartext-plus-footer-tag framing rather
    /// than `retransmit_protected`'s AEAD path. The whole frame chain is
    /// retried as one packet; none of it is split, matching the original
    /// send which always carries a single STREAM(sid=0) frame.
    fn retransmit_client_initial(&mut self, entry: RtbEntry, out: &mut [u8], now: Duration) -> Result<Option<usize>> {
        let header = LongHeader {
            packet_type: PacketType::ClientInitial,
            version: self.version,
            conn_id: self.conn_id,
            packet_number: 0,
        };
        let needed: usize = LongHeader::ENCODED_LEN + entry.frames.iter().map(Frame::encoding_size).sum::<usize>() + FOOTER_TAG_LEN;
        if needed > out.len() {
            // Doesn't fit at all right now; re-push untouched and signal NOBUF.
            self.rtb.add(entry);
            return Err(Error::NoBuf);
        }

        let pkt_num = self.take_pkt_num();
        let header = LongHeader {
            packet_number: pkt_num as u32,
            ..header
        };

        let mut enc = EncoderBuffer::new(out);
        header.encode(&mut enc)?;
        for f in &entry.frames {
            f.encode(&mut enc)?;
        }

        let written = enc.len();
        let pad_len = MIN_CLIENT_INITIAL_LEN.saturating_sub(written + FOOTER_TAG_LEN);
        frame::encode_padding(&mut enc, pad_len)?;
        let header_and_payload_len = enc.len();

        let tag = footer_tag(&out[..header_and_payload_len]);
        out[header_and_payload_len..header_and_payload_len + FOOTER_TAG_LEN].copy_from_slice(&tag);
        let total = header_and_payload_len + FOOTER_TAG_LEN;

        self.rtb.add(RtbEntry {
            pkt_num,
            expiry: now + INITIAL_EXPIRY,
            frames: entry.frames,
            kind: RtbPacketKind::ClientInitial,
        });

        self.callbacks.send_pkt(pkt_num);
        Ok(Some(total))
    }

    fn send_client_initial(&mut self, out: &mut [u8], now: Duration) -> Result<usize> {
        let (pkt_num, payload) = self.callbacks.send_client_initial()?;
        self.next_tx_pkt_num = pkt_num + 1;

        let header = LongHeader {
            packet_type: PacketType::ClientInitial,
            version: self.version,
            conn_id: self.conn_id,
            packet_number: pkt_num as u32,
        };

        let mut enc = EncoderBuffer::new(out);
        header.encode(&mut enc)?;
        let stream_frame = Frame::Stream(crate::frame::Stream {
            stream_id: 0,
            offset: 0,
            fin: false,
            data: payload,
        });
        stream_frame.encode(&mut enc)?;

        let written = enc.len();
        let pad_len = MIN_CLIENT_INITIAL_LEN.saturating_sub(written + FOOTER_TAG_LEN);
        frame::encode_padding(&mut enc, pad_len)?;
        let header_and_payload_len = enc.len();

        let tag = footer_tag(&out[..header_and_payload_len]);
        out[header_and_payload_len..header_and_payload_len + FOOTER_TAG_LEN].copy_from_slice(&tag);
        let total = header_and_payload_len + FOOTER_TAG_LEN;

        self.rtb.add(RtbEntry {
            pkt_num,
            expiry: now + INITIAL_EXPIRY,
            frames: vec![stream_frame],
            kind: RtbPacketKind::ClientInitial,
        });

        self.state = State::ClientWaitHandshake;
        self.callbacks.send_pkt(pkt_num);
        Ok(total)
    }

    fn send_client_cleartext(&mut self, out: &mut [u8]) -> Result<usize> {
        let payload = self.callbacks.send_client_cleartext()?;
        if payload.is_empty() && self.ack_tracker.is_empty() {
            if self.state == State::ClientHandshakeAlmostFinished {
                self.state = State::PostHandshake;
            }
            return Ok(0);
        }
        let n = self.send_cleartext_packet(out, PacketType::ClientCleartext, payload)?;
        Ok(n)
    }

    fn send_server_cleartext(&mut self, out: &mut [u8], initial: bool) -> Result<usize> {
        let mut pkt_num_override = None;
        let payload = self
            .callbacks
            .send_server_cleartext(initial, &mut pkt_num_override)?;
        if let Some(pkt_num) = pkt_num_override {
            self.next_tx_pkt_num = pkt_num;
        }
        if payload.is_empty() && self.ack_tracker.is_empty() {
            return Ok(0);
        }
        let n = self.send_cleartext_packet(out, PacketType::ServerCleartext, payload)?;
        if initial {
            self.state = State::ServerWaitHandshake;
        }
        Ok(n)
    }

    fn send_cleartext_packet(
        &mut self,
        out: &mut [u8],
        packet_type: PacketType,
        payload: bytes::Bytes,
    ) -> Result<usize> {
        let pkt_num = self.take_pkt_num();
        let header = LongHeader {
            packet_type,
            version: self.version,
            conn_id: self.conn_id,
            packet_number: pkt_num as u32,
        };

        let mut enc = EncoderBuffer::new(out);
        header.encode(&mut enc)?;

        if let Some(ack) = self.ack_tracker.assemble(Duration::from_millis(0)) {
            Frame::Ack(ack).encode(&mut enc)?;
        }
        if !payload.is_empty() {
            let stream_frame = Frame::Stream(crate::frame::Stream {
                stream_id: 0,
                offset: 0,
                fin: false,
                data: payload,
            });
            stream_frame.encode(&mut enc)?;
        }

        let header_and_payload_len = enc.len();

        let tag = footer_tag(&out[..header_and_payload_len]);
        out[header_and_payload_len..header_and_payload_len + FOOTER_TAG_LEN].copy_from_slice(&tag);

        self.callbacks.send_pkt(pkt_num);
        Ok(header_and_payload_len + FOOTER_TAG_LEN)
    }

    fn send_protected(&mut self, out: &mut [u8], now: Duration) -> Result<usize> {
        let pkt_num = self.take_pkt_num();
        let width = Width::Bits32;
        let header = ShortHeader {
            conn_id: self.conn_id,
            width,
            truncated_packet_number: width.truncate(pkt_num),
        };
        let mut header_buf = vec![0u8; header.encoded_len()];
        let mut henc = EncoderBuffer::new(&mut header_buf);
        header.encode(&mut henc)?;

        let mut plaintext = vec![0u8; out.len()];
        let mut penc = EncoderBuffer::new(&mut plaintext);
        let mut sent_frames = Vec::new();

        // 1. ACK, if due.
        if matches!(self.ack_tracker.next_ack_expiry(), Some(t) if t <= now) {
            if let Some(ack) = self.ack_tracker.assemble(now) {
                // ACK is not retransmittable; not pushed into sent_frames.
                Frame::Ack(ack).encode(&mut penc)?;
            }
        }

        // 2. MAX_STREAM_ID.
        if self.registry.max_remote_stream_id > self.local_settings.max_stream_id {
            let frame = Frame::MaxStreamId(MaxStreamId {
                max_stream_id: self.registry.max_remote_stream_id,
            });
            if penc.remaining_capacity() >= frame.encoding_size() {
                frame.encode(&mut penc)?;
                self.local_settings.max_stream_id = self.registry.max_remote_stream_id;
                self.registry.local_max_stream_id = self.registry.max_remote_stream_id;
                sent_frames.push(frame);
            }
        }

        // 3. MAX_DATA.
        if self.conn_should_send_max_data() {
            let frame = Frame::MaxData(MaxData {
                max_data: self.unsent_max_rx_offset.high,
            });
            if penc.remaining_capacity() >= frame.encoding_size() {
                frame.encode(&mut penc)?;
                self.max_rx_offset = self.unsent_max_rx_offset;
                sent_frames.push(frame);
            }
        }

        // 4. Drain the flow-control-pending queue into MAX_STREAM_DATA frames.
        while let Some(stream_id) = self.fc_pending.pop_front() {
            let Some(strm) = self.registry.find_mut(stream_id) else {
                continue;
            };
            let frame = Frame::MaxStreamData(MaxStreamData {
                stream_id,
                max_stream_data: strm.unsent_max_rx_offset,
            });
            if penc.remaining_capacity() < frame.encoding_size() {
                self.fc_pending.push_front(stream_id);
                break;
            }
            frame.encode(&mut penc)?;
            strm.max_rx_offset = strm.unsent_max_rx_offset;
            strm.fc_pending = false;
            sent_frames.push(frame);
        }

        // 5. Drain the frame queue (control + stream data), splitting
        // oversized STREAM frames.
        while let Some(frame) = self.frame_queue.pop_front() {
            let left = penc.remaining_capacity();
            if frame.encoding_size() <= left {
                frame.encode(&mut penc)?;
                sent_frames.push(frame);
                continue;
            }
            if let Frame::Stream(s) = frame {
                if let Some(head_len) = stream_payload_budget(left) {
                    let (head, tail) = s.split(head_len);
                    let head_frame = Frame::Stream(head);
                    head_frame.encode(&mut penc)?;
                    sent_frames.push(head_frame);
                    self.frame_queue.push_front(Frame::Stream(tail));
                } else {
                    self.frame_queue.push_front(Frame::Stream(s));
                }
            } else {
                self.frame_queue.push_front(frame);
            }
            break;
        }

        if sent_frames.is_empty() && penc.len() == 0 {
            return Ok(0);
        }

        let plaintext_len = penc.len();
        let sealed_len = self.seal(&header_buf, &mut plaintext[..plaintext_len], out, header.encoded_len())?;

        if !sent_frames.is_empty() {
            self.rtb.add(RtbEntry {
                pkt_num,
                expiry: now + INITIAL_EXPIRY,
                frames: sent_frames,
                kind: RtbPacketKind::Protected,
            });
        }

        self.callbacks.send_pkt(pkt_num);
        Ok(header.encoded_len() + sealed_len)
    }

    /// One-shot emission of a single STREAM frame, truncated to whatever
    /// fits under the stream's and connection's tx flow-control windows and
    /// `out`'s remaining space (§6: `write_stream`). Returns
    /// `(bytes_written, bytes_of_data_consumed)`; `fin` is only actually set
    /// on the wire if the whole of `data` was consumed.
    #[tracing::instrument(level = "trace", skip(self, data, out))]
    pub fn write_stream(
        &mut self,
        stream_id: u32,
        fin: bool,
        data: &bytes::Bytes,
        out: &mut [u8],
        now: Duration,
    ) -> Result<(usize, usize)> {
        if !matches!(self.state, State::PostHandshake | State::CloseWait) {
            return Err(Error::InvalidState);
        }

        let (tx_offset, stream_credit) = {
            let strm = self.registry.find(stream_id).ok_or(Error::InvalidArgument)?;
            (strm.tx_offset, strm.max_tx_offset.saturating_sub(strm.tx_offset))
        };
        let conn_credit = (self.max_tx_offset_high * 1024).saturating_sub(self.tx_offset.as_u64());

        let width = Width::Bits32;
        let header_len = ShortHeader {
            conn_id: self.conn_id,
            width,
            truncated_packet_number: 0,
        }
        .encoded_len();
        let space = stream_payload_budget(out.len().saturating_sub(header_len)).unwrap_or(0);
        let datalen = data
            .len()
            .min(stream_credit as usize)
            .min(conn_credit as usize)
            .min(space);

        if datalen == 0 && !(fin && data.is_empty()) {
            return Ok((0, 0));
        }

        let pkt_num = self.take_pkt_num();
        let header = ShortHeader {
            conn_id: self.conn_id,
            width,
            truncated_packet_number: width.truncate(pkt_num),
        };
        let mut header_buf = vec![0u8; header.encoded_len()];
        let mut henc = EncoderBuffer::new(&mut header_buf);
        header.encode(&mut henc)?;

        let frame_fin = fin && datalen == data.len();
        let frame = Frame::Stream(crate::frame::Stream {
            stream_id,
            offset: tx_offset,
            fin: frame_fin,
            data: data.slice(..datalen),
        });

        let mut plaintext = vec![0u8; out.len()];
        let mut penc = EncoderBuffer::new(&mut plaintext);
        frame.encode(&mut penc)?;
        let plaintext_len = penc.len();

        let sealed_len = self.seal(&header_buf, &mut plaintext[..plaintext_len], out, header.encoded_len())?;

        let strm = self.registry.find_mut(stream_id).expect("checked above");
        strm.tx_offset += datalen as u64;
        if frame_fin {
            strm.shutdown(crate::stream::ShutdownFlags::SHUT_WR);
        }
        self.tx_offset.increment(datalen as u64);

        self.rtb.add(RtbEntry {
            pkt_num,
            expiry: now + INITIAL_EXPIRY,
            frames: vec![frame],
            kind: RtbPacketKind::Protected,
        });

        self.callbacks.send_pkt(pkt_num);
        Ok((header.encoded_len() + sealed_len, datalen))
    }

    /// AEAD-seals `plaintext` via the embedder callback, writing the
    /// header followed by the sealed payload into `out` (§4.4).
    fn seal(&mut self, header_bytes: &[u8], plaintext: &mut [u8], out: &mut [u8], header_len: usize) -> Result<usize> {
        let keys = self.tx_keys.as_ref().ok_or(Error::InvalidState)?;
        let pkt_num = self.next_tx_pkt_num - 1;
        let nonce = keys.nonce(pkt_num);
        let key = keys.key.clone();
        out[..header_len].copy_from_slice(header_bytes);
        self.callbacks
            .encrypt(&mut out[header_len..], plaintext, &key, nonce, header_bytes)
    }
}
