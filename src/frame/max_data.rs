use super::Tag;
use crate::error::{Error, Result};
use s2n_codec::{DecoderBufferMut, Encoder, EncoderBuffer};

/// Informs the peer of the maximum amount of data (in kibibyte units, see
/// §4.7's split-offset representation) that may be sent on the connection
/// as a whole.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaxData {
    pub max_data: u64,
}

impl MaxData {
    pub fn encoding_size(&self) -> usize {
        1 + 8
    }

    pub fn encode(&self, buffer: &mut EncoderBuffer) {
        buffer.encode(&(Tag::MaxData as u8));
        buffer.encode(&self.max_data);
    }

    pub fn decode(buffer: DecoderBufferMut) -> Result<(MaxData, DecoderBufferMut)> {
        let (_tag, buffer) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
        let (max_data, buffer) = buffer.decode::<u64>().map_err(|_| Error::Proto)?;
        Ok((MaxData { max_data }, buffer))
    }
}
