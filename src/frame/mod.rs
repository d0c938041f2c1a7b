//! Frame types carried inside a packet payload.
//!
//! Grounded on `s2n-quic-core::frame` (one file per frame type, a shared
//! `mod.rs` tying them into a single enum) but trimmed to exactly the
//! frames this transport's Connection Core schedules or dispatches: ACK,
//! STREAM, the three flow-control advertisements, PADDING, and
//! CONNECTION_CLOSE (observed, not acted on by the core itself).

mod ack;
mod max_data;
mod max_stream_data;
mod max_stream_id;
mod stream;

pub use ack::{Ack, AckBlock, MAX_ACK_BLOCKS, MAX_ACK_GAP};
pub use max_data::MaxData;
pub use max_stream_data::MaxStreamData;
pub use max_stream_id::MaxStreamId;
pub use stream::{Stream, STREAM_OVERHEAD};

use crate::error::{Error, Result};
use s2n_codec::{DecoderBufferMut, Encoder, EncoderBuffer};

/// The frame-type tag as it would appear on the wire, used only to
/// distinguish variants during decode; the wire layout itself is an
/// out-of-scope concern this crate satisfies concretely via `s2n-codec`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Padding = 0x00,
    Ack = 0x02,
    Stream = 0x08,
    MaxData = 0x10,
    MaxStreamData = 0x11,
    MaxStreamId = 0x12,
    ConnectionClose = 0x1c,
}

impl Tag {
    fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0x00 => Tag::Padding,
            0x02 => Tag::Ack,
            0x08 => Tag::Stream,
            0x10 => Tag::MaxData,
            0x11 => Tag::MaxStreamData,
            0x12 => Tag::MaxStreamId,
            0x1c => Tag::ConnectionClose,
            _ => return None,
        })
    }
}

/// A frame queued for transmission or dispatched on receipt.
///
/// The Frame Queue (§4.3 of the component table) is a FIFO of exactly this
/// type: it is documented as carrying the `MAX_*` control frames, but
/// §4.4's packet-assembly algorithm also drains queued [`Frame::Stream`]
/// entries through it, so the queue element type must cover both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Ack(Ack),
    Stream(Stream),
    MaxData(MaxData),
    MaxStreamData(MaxStreamData),
    MaxStreamId(MaxStreamId),
    /// An opaque CONNECTION_CLOSE payload, passed through to the
    /// `recv_frame` observer callback; the core never emits one itself.
    ConnectionClose { error_code: u16 },
}

impl Frame {
    pub fn tag(&self) -> Tag {
        match self {
            Frame::Ack(_) => Tag::Ack,
            Frame::Stream(_) => Tag::Stream,
            Frame::MaxData(_) => Tag::MaxData,
            Frame::MaxStreamData(_) => Tag::MaxStreamData,
            Frame::MaxStreamId(_) => Tag::MaxStreamId,
            Frame::ConnectionClose { .. } => Tag::ConnectionClose,
        }
    }

    /// Whether losing this frame requires retransmission, i.e. it is not
    /// purely informational. ACK and CONNECTION_CLOSE are not
    /// retransmittable; everything else is.
    pub fn is_retransmittable(&self) -> bool {
        !matches!(self, Frame::Ack(_) | Frame::ConnectionClose { .. })
    }

    pub fn encoding_size(&self) -> usize {
        match self {
            Frame::Ack(f) => f.encoding_size(),
            Frame::Stream(f) => f.encoding_size(),
            Frame::MaxData(f) => f.encoding_size(),
            Frame::MaxStreamData(f) => f.encoding_size(),
            Frame::MaxStreamId(f) => f.encoding_size(),
            Frame::ConnectionClose { .. } => 1 + 2,
        }
    }

    pub fn encode(&self, buffer: &mut EncoderBuffer) -> Result<()> {
        if buffer.remaining_capacity() < self.encoding_size() {
            return Err(Error::NoBuf);
        }
        match self {
            Frame::Ack(f) => f.encode(buffer),
            Frame::Stream(f) => f.encode(buffer),
            Frame::MaxData(f) => f.encode(buffer),
            Frame::MaxStreamData(f) => f.encode(buffer),
            Frame::MaxStreamId(f) => f.encode(buffer),
            Frame::ConnectionClose { error_code } => {
                buffer.encode(&(Tag::ConnectionClose as u8));
                buffer.encode(error_code);
            }
        }
        Ok(())
    }

    pub fn decode(buffer: DecoderBufferMut) -> Result<(Frame, DecoderBufferMut)> {
        let (tag, _) = buffer
            .peek()
            .decode::<u8>()
            .map_err(|_| Error::Proto)?;
        let tag = Tag::from_u8(tag).ok_or(Error::Proto)?;
        match tag {
            Tag::Padding => {
                let (_, rest) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
                Frame::decode(rest)
            }
            Tag::Ack => {
                let (f, rest) = Ack::decode(buffer)?;
                Ok((Frame::Ack(f), rest))
            }
            Tag::Stream => {
                let (f, rest) = Stream::decode(buffer)?;
                Ok((Frame::Stream(f), rest))
            }
            Tag::MaxData => {
                let (f, rest) = MaxData::decode(buffer)?;
                Ok((Frame::MaxData(f), rest))
            }
            Tag::MaxStreamData => {
                let (f, rest) = MaxStreamData::decode(buffer)?;
                Ok((Frame::MaxStreamData(f), rest))
            }
            Tag::MaxStreamId => {
                let (f, rest) = MaxStreamId::decode(buffer)?;
                Ok((Frame::MaxStreamId(f), rest))
            }
            Tag::ConnectionClose => {
                let (_tag, rest) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
                let (error_code, rest) = rest.decode::<u16>().map_err(|_| Error::Proto)?;
                Ok((Frame::ConnectionClose { error_code }, rest))
            }
        }
    }
}

/// Encodes a single PADDING byte; used by the Packet Assembler to pad a
/// `CLIENT_INITIAL` packet up to the minimum datagram size (§4.4).
pub fn encode_padding(buffer: &mut EncoderBuffer, len: usize) -> Result<()> {
    if buffer.remaining_capacity() < len {
        return Err(Error::NoBuf);
    }
    for _ in 0..len {
        buffer.encode(&(Tag::Padding as u8));
    }
    Ok(())
}
