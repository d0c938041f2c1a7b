use super::Tag;
use crate::error::{Error, Result};
use s2n_codec::{DecoderBufferMut, Encoder, EncoderBuffer};
use smallvec::SmallVec;

/// The largest number of `(gap, blklen)` pairs an ACK frame may carry, and
/// the largest value a single `gap` may take (§4.2): assembly stops early
/// rather than exceeding either.
pub const MAX_ACK_BLOCKS: usize = 255;
pub const MAX_ACK_GAP: u8 = 255;

/// An additional run of acknowledged packet numbers below `largest_ack`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AckBlock {
    pub gap: u8,
    pub blklen: u64,
}

/// An ACK frame: `largest_ack`, `ack_delay`, the length of the first
/// (highest) contiguous block, and up to [`MAX_ACK_BLOCKS`] further
/// `(gap, blklen)` pairs (§4.2, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub largest_ack: u64,
    pub ack_delay: u64,
    pub first_ack_blklen: u64,
    pub blocks: SmallVec<[AckBlock; 4]>,
}

impl Ack {
    pub fn encoding_size(&self) -> usize {
        1 + 8 + 8 + 8 + 1 + self.blocks.len() * (1 + 8)
    }

    pub fn encode(&self, buffer: &mut EncoderBuffer) {
        buffer.encode(&(Tag::Ack as u8));
        buffer.encode(&self.largest_ack);
        buffer.encode(&self.ack_delay);
        buffer.encode(&self.first_ack_blklen);
        buffer.encode(&(self.blocks.len() as u8));
        for block in &self.blocks {
            buffer.encode(&block.gap);
            buffer.encode(&block.blklen);
        }
    }

    pub fn decode(buffer: DecoderBufferMut) -> Result<(Ack, DecoderBufferMut)> {
        let (_tag, buffer) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
        let (largest_ack, buffer) = buffer.decode::<u64>().map_err(|_| Error::Proto)?;
        let (ack_delay, buffer) = buffer.decode::<u64>().map_err(|_| Error::Proto)?;
        let (first_ack_blklen, buffer) = buffer.decode::<u64>().map_err(|_| Error::Proto)?;
        let (num_blocks, mut buffer) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;

        let mut blocks = SmallVec::new();
        for _ in 0..num_blocks {
            let (gap, rest) = buffer.decode::<u8>().map_err(|_| Error::Proto)?;
            let (blklen, rest) = rest.decode::<u64>().map_err(|_| Error::Proto)?;
            blocks.push(AckBlock { gap, blklen });
            buffer = rest;
        }

        Ok((
            Ack {
                largest_ack,
                ack_delay,
                first_ack_blklen,
                blocks,
            },
            buffer,
        ))
    }

    /// Validates that blocks strictly descend (each block's range lies
    /// entirely below the previous one), as required before handing the
    /// frame to the Retransmission Buffer (§4.5 step 3, ACK dispatch).
    pub fn validate_monotonic(&self) -> Result<()> {
        if self.first_ack_blklen > self.largest_ack {
            return Err(Error::Proto);
        }
        let mut floor = self.largest_ack - self.first_ack_blklen;
        for block in &self.blocks {
            let gap = block.gap as u64;
            if floor < gap + 1 {
                return Err(Error::Proto);
            }
            let block_largest = floor - gap - 1;
            let block_smallest = block_largest.saturating_sub(block.blklen);
            if block_smallest > block_largest {
                return Err(Error::Proto);
            }
            floor = block_smallest;
        }
        Ok(())
    }

    /// Returns every packet number covered by this frame, largest first.
    pub fn packet_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        let first_run = {
            let largest = self.largest_ack;
            let smallest = largest - self.first_ack_blklen;
            (smallest..=largest).rev()
        };

        let mut floor = self.largest_ack - self.first_ack_blklen;
        let mut further_runs: SmallVec<[core::ops::RangeInclusive<u64>; 4]> = SmallVec::new();
        for block in &self.blocks {
            let largest = floor - block.gap as u64 - 1;
            let smallest = largest - block.blklen;
            further_runs.push(smallest..=largest);
            floor = smallest;
        }

        first_run.chain(further_runs.into_iter().flat_map(|r| r.rev().collect::<SmallVec<[u64; 8]>>()))
    }
}
