use super::Tag;
use crate::error::{Error, Result};
use bytes::Bytes;
use s2n_codec::{DecoderBufferMut, Encoder, EncoderBuffer};

/// Fixed overhead of a STREAM frame's header fields (tag, stream id,
/// offset, a 4-byte length prefix, and the fin flag folded into the tag
/// byte in the wire form this crate uses). Named `STREAM_OVERHEAD` in
/// `original_source`; gates both the decision to split a frame across
/// packets and the split point itself (§4.4 step 5, §9.1).
pub const STREAM_OVERHEAD: usize = 1 + 4 + 8 + 4;

/// A chunk of a stream's byte sequence (§3, §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub stream_id: u32,
    pub offset: u64,
    pub fin: bool,
    pub data: Bytes,
}

impl Stream {
    pub fn datalen(&self) -> usize {
        self.data.len()
    }

    /// The (exclusive) end offset this frame carries data up to.
    pub fn end_offset(&self) -> Option<u64> {
        self.offset.checked_add(self.data.len() as u64)
    }

    pub fn encoding_size(&self) -> usize {
        STREAM_OVERHEAD + self.data.len()
    }

    pub fn encode(&self, buffer: &mut EncoderBuffer) {
        let tag = Tag::Stream as u8 | if self.fin { 0x01 } else { 0x00 };
        buffer.encode(&tag);
        buffer.encode(&self.stream_id);
        buffer.encode(&self.offset);
        buffer.encode(&(self.data.len() as u32));
        buffer.write_sized(self.data.len(), |dst| dst.copy_from_slice(&self.data));
    }

    pub fn decode(buffer: DecoderBufferMut) -> Result<(Stream, DecoderBufferMut)> {
        let (tag, buffer) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
        let fin = tag & 0x01 != 0;
        let (stream_id, buffer) = buffer.decode::<u32>().map_err(|_| Error::Proto)?;
        let (offset, buffer) = buffer.decode::<u64>().map_err(|_| Error::Proto)?;
        let (datalen, buffer) = buffer.decode::<u32>().map_err(|_| Error::Proto)?;
        let (slice, buffer) = buffer
            .decode_slice(datalen as usize)
            .map_err(|_| Error::Proto)?;
        let data = Bytes::copy_from_slice(slice.into_less_safe_slice());
        Ok((
            Stream {
                stream_id,
                offset,
                fin,
                data,
            },
            buffer,
        ))
    }

    /// Splits this frame so the head occupies exactly `head_len` bytes of
    /// data (plus overhead), returning `(head, tail)`. Used when a queued
    /// STREAM frame doesn't fit the remaining packet space but the
    /// remainder is worth sending as its own frame (§4.4 step 5).
    pub fn split(self, head_len: usize) -> (Stream, Stream) {
        let head_data = self.data.slice(..head_len);
        let tail_data = self.data.slice(head_len..);
        let head = Stream {
            stream_id: self.stream_id,
            offset: self.offset,
            fin: false,
            data: head_data,
        };
        let tail = Stream {
            stream_id: self.stream_id,
            offset: self.offset + head_len as u64,
            fin: self.fin,
            data: tail_data,
        };
        (head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let frame = Stream {
            stream_id: 3,
            offset: 10,
            fin: true,
            data: Bytes::from_static(b"hello"),
        };
        let mut raw = [0u8; 64];
        let mut enc = EncoderBuffer::new(&mut raw);
        frame.encode(&mut enc);
        let (used, _) = enc.split_off();
        let (decoded, _) = Stream::decode(DecoderBufferMut::new(used)).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn split_preserves_bytes_and_fin() {
        let frame = Stream {
            stream_id: 1,
            offset: 0,
            fin: true,
            data: Bytes::from_static(b"abcdefgh"),
        };
        let (head, tail) = frame.split(3);
        assert_eq!(&head.data[..], b"abc");
        assert!(!head.fin);
        assert_eq!(&tail.data[..], b"defgh");
        assert_eq!(tail.offset, 3);
        assert!(tail.fin);
    }
}
