use crate::error::{Error, Result};
use crate::packet_number::Width;
use s2n_codec::{DecoderBufferMut, Encoder, EncoderBuffer};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// The most significant bit of byte 0 selects long vs. short header form
/// (grounded on `s2n-quic-core::packet::long`'s `Header Form` bit).
const HEADER_FORM_LONG: u8 = 0x80;
const LONG_TYPE_MASK: u8 = 0x30;
const SHORT_WIDTH_MASK: u8 = 0x03;

/// Fixed-length integrity tag appended to unprotected long-header packets
/// (§4.4, §6). A cleartext QUIC handshake packet is not AEAD-sealed, but
/// it still carries a footer so a corrupted datagram is detected rather
/// than handed to the state machine as valid bytes.
pub const FOOTER_TAG_LEN: usize = 8;

pub(crate) fn footer_tag(header_and_payload: &[u8]) -> [u8; FOOTER_TAG_LEN] {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write(header_and_payload);
    hasher.finish().to_be_bytes()
}

/// The long-header packet types this transport emits (§4.6); a subset of
/// the RFC's long packet type field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    ClientInitial = 0x00,
    ServerCleartext = 0x10,
    ClientCleartext = 0x20,
}

impl PacketType {
    fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0x00 => PacketType::ClientInitial,
            0x10 => PacketType::ServerCleartext,
            0x20 => PacketType::ClientCleartext,
            _ => return None,
        })
    }
}

/// An unprotected, long-form header used during the handshake (§4.4, §4.6).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LongHeader {
    pub packet_type: PacketType,
    pub version: u32,
    pub conn_id: u64,
    pub packet_number: u32,
}

impl LongHeader {
    pub const ENCODED_LEN: usize = 1 + 4 + 8 + 4;

    pub fn encode(&self, buffer: &mut EncoderBuffer) -> Result<()> {
        if buffer.remaining_capacity() < Self::ENCODED_LEN {
            return Err(Error::NoBuf);
        }
        let tag = HEADER_FORM_LONG | (self.packet_type as u8);
        buffer.encode(&tag);
        buffer.encode(&self.version);
        buffer.encode(&self.conn_id);
        buffer.encode(&self.packet_number);
        Ok(())
    }

    pub fn decode(buffer: DecoderBufferMut) -> Result<(LongHeader, DecoderBufferMut)> {
        let (tag, buffer) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
        if tag & HEADER_FORM_LONG == 0 {
            return Err(Error::Proto);
        }
        let packet_type = PacketType::from_bits(tag & LONG_TYPE_MASK).ok_or(Error::Proto)?;
        let (version, buffer) = buffer.decode::<u32>().map_err(|_| Error::Proto)?;
        let (conn_id, buffer) = buffer.decode::<u64>().map_err(|_| Error::Proto)?;
        let (packet_number, buffer) = buffer.decode::<u32>().map_err(|_| Error::Proto)?;
        Ok((
            LongHeader {
                packet_type,
                version,
                conn_id,
                packet_number,
            },
            buffer,
        ))
    }

    /// Appends the footer tag over everything written so far (header plus
    /// payload), matching the codec's `final()` step (§4.4).
    pub fn append_footer(header_and_payload: &[u8], buffer: &mut EncoderBuffer) -> Result<()> {
        if buffer.remaining_capacity() < FOOTER_TAG_LEN {
            return Err(Error::NoBuf);
        }
        let tag = footer_tag(header_and_payload);
        buffer.write_slice(&tag);
        Ok(())
    }

    /// Verifies the trailing footer tag, matching the codec's `verify()`
    /// step on receipt (§4.4).
    pub fn verify_footer(header_and_payload: &[u8], tag: &[u8]) -> Result<()> {
        if tag.len() != FOOTER_TAG_LEN {
            return Err(Error::BadPacketHash);
        }
        if footer_tag(header_and_payload)[..] != tag[..] {
            return Err(Error::BadPacketHash);
        }
        Ok(())
    }
}

/// A protected, short-form header used post-handshake (§4.4, §4.5, §4.6).
/// The packet number is carried truncated to 8, 16, or 32 bits; the full
/// value is reconstructed by the ingestor via `packet_number::adjust`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShortHeader {
    pub conn_id: u64,
    pub width: Width,
    pub truncated_packet_number: u64,
}

impl ShortHeader {
    pub fn encoded_len(&self) -> usize {
        1 + 8 + (self.width.bits() as usize / 8)
    }

    pub fn encode(&self, buffer: &mut EncoderBuffer) -> Result<()> {
        if buffer.remaining_capacity() < self.encoded_len() {
            return Err(Error::NoBuf);
        }
        let width_bits = match self.width {
            Width::Bits8 => 0u8,
            Width::Bits16 => 1u8,
            Width::Bits32 => 2u8,
        };
        buffer.encode(&width_bits);
        buffer.encode(&self.conn_id);
        match self.width {
            Width::Bits8 => buffer.encode(&(self.truncated_packet_number as u8)),
            Width::Bits16 => buffer.encode(&(self.truncated_packet_number as u16)),
            Width::Bits32 => buffer.encode(&(self.truncated_packet_number as u32)),
        }
        Ok(())
    }

    pub fn decode(buffer: DecoderBufferMut) -> Result<(ShortHeader, DecoderBufferMut)> {
        let (tag, buffer) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
        if tag & HEADER_FORM_LONG != 0 {
            return Err(Error::Proto);
        }
        let width = match tag & SHORT_WIDTH_MASK {
            0 => Width::Bits8,
            1 => Width::Bits16,
            2 => Width::Bits32,
            _ => return Err(Error::Proto),
        };
        let (conn_id, buffer) = buffer.decode::<u64>().map_err(|_| Error::Proto)?;
        let (truncated_packet_number, buffer) = match width {
            Width::Bits8 => {
                let (v, buffer) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
                (v as u64, buffer)
            }
            Width::Bits16 => {
                let (v, buffer) = buffer.decode::<u16>().map_err(|_| Error::Proto)?;
                (v as u64, buffer)
            }
            Width::Bits32 => {
                let (v, buffer) = buffer.decode::<u32>().map_err(|_| Error::Proto)?;
                (v as u64, buffer)
            }
        };
        Ok((
            ShortHeader {
                conn_id,
                width,
                truncated_packet_number,
            },
            buffer,
        ))
    }
}

/// Either header form, selected on decode by byte 0's top bit (§4.5).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Header {
    Long(LongHeader),
    Short(ShortHeader),
}

impl Header {
    pub fn decode(buffer: DecoderBufferMut) -> Result<(Header, DecoderBufferMut)> {
        let (tag, _) = buffer.peek().decode::<u8>().map_err(|_| Error::Proto)?;
        if tag & HEADER_FORM_LONG != 0 {
            let (hd, rest) = LongHeader::decode(buffer)?;
            Ok((Header::Long(hd), rest))
        } else {
            let (hd, rest) = ShortHeader::decode(buffer)?;
            Ok((Header::Short(hd), rest))
        }
    }

    pub fn conn_id(&self) -> u64 {
        match self {
            Header::Long(hd) => hd.conn_id,
            Header::Short(hd) => hd.conn_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_header_round_trips() {
        let hd = LongHeader {
            packet_type: PacketType::ClientInitial,
            version: 1,
            conn_id: 0xdead_beef,
            packet_number: 100,
        };
        let mut raw = [0u8; 64];
        let mut enc = EncoderBuffer::new(&mut raw);
        hd.encode(&mut enc).unwrap();
        let (used, _) = enc.split_off();
        let (decoded, _) = LongHeader::decode(DecoderBufferMut::new(used)).unwrap();
        assert_eq!(decoded, hd);
    }

    #[test]
    fn short_header_round_trips_each_width() {
        for width in [Width::Bits8, Width::Bits16, Width::Bits32] {
            let hd = ShortHeader {
                conn_id: 42,
                width,
                truncated_packet_number: 0xab,
            };
            let mut raw = [0u8; 64];
            let mut enc = EncoderBuffer::new(&mut raw);
            hd.encode(&mut enc).unwrap();
            let (used, _) = enc.split_off();
            let (decoded, _) = ShortHeader::decode(DecoderBufferMut::new(used)).unwrap();
            assert_eq!(decoded, hd);
        }
    }

    #[test]
    fn footer_tag_detects_corruption() {
        let data = b"header-and-payload-bytes";
        let tag = footer_tag(data);
        LongHeader::verify_footer(data, &tag).unwrap();
        let mut corrupted = *data;
        corrupted[0] ^= 0xff;
        assert!(LongHeader::verify_footer(&corrupted, &tag).is_err());
    }
}
