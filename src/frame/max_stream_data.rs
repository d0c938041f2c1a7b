use super::Tag;
use crate::error::{Error, Result};
use s2n_codec::{DecoderBufferMut, Encoder, EncoderBuffer};

/// Informs the peer of the maximum offset that may be sent on a given
/// stream (§4.4 step 4, §4.7).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaxStreamData {
    pub stream_id: u32,
    pub max_stream_data: u64,
}

impl MaxStreamData {
    pub fn encoding_size(&self) -> usize {
        1 + 4 + 8
    }

    pub fn encode(&self, buffer: &mut EncoderBuffer) {
        buffer.encode(&(Tag::MaxStreamData as u8));
        buffer.encode(&self.stream_id);
        buffer.encode(&self.max_stream_data);
    }

    pub fn decode(buffer: DecoderBufferMut) -> Result<(MaxStreamData, DecoderBufferMut)> {
        let (_tag, buffer) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
        let (stream_id, buffer) = buffer.decode::<u32>().map_err(|_| Error::Proto)?;
        let (max_stream_data, buffer) = buffer.decode::<u64>().map_err(|_| Error::Proto)?;
        Ok((
            MaxStreamData {
                stream_id,
                max_stream_data,
            },
            buffer,
        ))
    }
}
