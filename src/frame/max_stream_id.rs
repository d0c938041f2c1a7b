use super::Tag;
use crate::error::{Error, Result};
use s2n_codec::{DecoderBufferMut, Encoder, EncoderBuffer};

/// Raises the limit on the highest peer-initiated stream id the peer may
/// open (§4.4 step 2, §4.8).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaxStreamId {
    pub max_stream_id: u32,
}

impl MaxStreamId {
    pub fn encoding_size(&self) -> usize {
        1 + 4
    }

    pub fn encode(&self, buffer: &mut EncoderBuffer) {
        buffer.encode(&(Tag::MaxStreamId as u8));
        buffer.encode(&self.max_stream_id);
    }

    pub fn decode(buffer: DecoderBufferMut) -> Result<(MaxStreamId, DecoderBufferMut)> {
        let (_tag, buffer) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
        let (max_stream_id, buffer) = buffer.decode::<u32>().map_err(|_| Error::Proto)?;
        Ok((MaxStreamId { max_stream_id }, buffer))
    }
}
