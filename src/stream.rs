//! Per-stream send/receive offsets, flow-control windows, the reassembly
//! buffer, and shutdown flags (§3, §4.1).
//!
//! Grounded on `s2n-quic-core::buffer::ReceiveBuffer` for the general
//! shape of "accumulate out-of-order chunks, release a contiguous prefix"
//! but realized as a plain `BTreeMap<offset, Bytes>` rather than the
//! teacher's slab-of-slots allocator: the reassembly buffer is named as an
//! out-of-scope utility container in this spec, so this module gives it
//! the simplest concrete shape that satisfies §4.1's described behavior.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::BTreeMap;

/// Half-close bookkeeping (§3): a small bitfield, not worth pulling in a
/// flags crate for two bits.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ShutdownFlags(u8);

impl ShutdownFlags {
    pub const SHUT_RD: ShutdownFlags = ShutdownFlags(0b01);
    pub const SHUT_WR: ShutdownFlags = ShutdownFlags(0b10);
    pub const SHUT_RDWR: ShutdownFlags = ShutdownFlags(0b11);

    pub const fn empty() -> Self {
        ShutdownFlags(0)
    }

    pub fn contains(self, other: ShutdownFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for ShutdownFlags {
    type Output = ShutdownFlags;
    fn bitor(self, rhs: ShutdownFlags) -> ShutdownFlags {
        ShutdownFlags(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for ShutdownFlags {
    fn bitor_assign(&mut self, rhs: ShutdownFlags) {
        self.0 |= rhs.0;
    }
}

/// Out-of-order bytes awaiting contiguous delivery (§3, §4.1).
#[derive(Debug, Default)]
pub struct Reassembler {
    chunks: BTreeMap<u64, Bytes>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a chunk that arrived ahead of the contiguous front.
    pub fn store(&mut self, offset: u64, data: Bytes) {
        if !data.is_empty() {
            self.chunks.insert(offset, data);
        }
    }

    /// Drops any buffered bytes with end-offset at or before `rx_offset`,
    /// i.e. already delivered (§4.1: "the reassembly buffer drops the
    /// prefix").
    pub fn drop_delivered_prefix(&mut self, rx_offset: u64) {
        self.chunks
            .retain(|&offset, data| offset + data.len() as u64 > rx_offset);
    }

    /// Drains every chunk contiguous with `rx_offset`, advancing it as it
    /// goes, stopping at the first gap. Returns `(new_rx_offset, chunks)`.
    pub fn drain_contiguous(&mut self, mut rx_offset: u64) -> (u64, Vec<Bytes>) {
        let mut out = Vec::new();
        loop {
            let Some((&offset, _)) = self.chunks.range(..=rx_offset).next_back() else {
                break;
            };
            let data = match self.chunks.get(&offset) {
                Some(d) => d.clone(),
                None => break,
            };
            let end = offset + data.len() as u64;
            if offset > rx_offset || end <= rx_offset {
                break;
            }
            self.chunks.remove(&offset);
            if end > rx_offset {
                let skip = (rx_offset - offset) as usize;
                out.push(data.slice(skip..));
                rx_offset = end;
            }
        }
        (rx_offset, out)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// A single multiplexed byte stream (§3, §4.1).
#[derive(Debug)]
pub struct Stream {
    pub stream_id: u32,
    pub tx_offset: u64,
    pub max_tx_offset: u64,
    pub last_rx_offset: u64,
    pub max_rx_offset: u64,
    pub unsent_max_rx_offset: u64,
    /// First byte not yet delivered contiguously to the application;
    /// advanced only by draining the reassembly buffer (§4.1, §4.5).
    pub contiguous_rx_offset: u64,
    pub reassembly: Reassembler,
    pub shutdown: ShutdownFlags,
    /// Linked into the connection's flow-control-pending queue when this
    /// stream's credit window has shrunk past half (§4.7, §9 Decision:
    /// realized as a flag plus a side `VecDeque` rather than an intrusive
    /// list).
    pub fc_pending: bool,
}

impl Stream {
    pub fn new(stream_id: u32, initial_max_rx: u64, initial_max_tx: u64) -> Self {
        Self {
            stream_id,
            tx_offset: 0,
            max_tx_offset: initial_max_tx,
            last_rx_offset: 0,
            max_rx_offset: initial_max_rx,
            unsent_max_rx_offset: initial_max_rx,
            contiguous_rx_offset: 0,
            reassembly: Reassembler::new(),
            shutdown: ShutdownFlags::empty(),
            fc_pending: false,
        }
    }

    /// First byte not yet delivered contiguously to the application.
    pub fn rx_offset(&self) -> u64 {
        self.contiguous_rx_offset
    }

    /// Stores an out-of-order STREAM payload (§4.1: `recv_reordered`).
    pub fn recv_reordered(&mut self, offset: u64, data: Bytes) -> Result<()> {
        if self.shutdown.contains(ShutdownFlags::SHUT_RD) {
            return Err(Error::Proto);
        }
        self.reassembly.store(offset, data);
        Ok(())
    }

    /// Delivers `data` at `rx_offset` (already known contiguous), then
    /// drains any further chunks the reassembly buffer can now release,
    /// advancing `contiguous_rx_offset` as it goes (§4.5's reassembly
    /// step). Returns every chunk released, in delivery order.
    pub fn deliver_and_drain(&mut self, offset: u64, data: Bytes) -> Vec<Bytes> {
        let mut delivered = Vec::new();
        if offset <= self.contiguous_rx_offset {
            let skip = (self.contiguous_rx_offset - offset) as usize;
            if skip < data.len() || data.is_empty() {
                let piece = data.slice(skip.min(data.len())..);
                if !piece.is_empty() {
                    self.contiguous_rx_offset += piece.len() as u64;
                    delivered.push(piece);
                }
            }
            let (new_offset, rest) = self.reassembly.drain_contiguous(self.contiguous_rx_offset);
            self.contiguous_rx_offset = new_offset;
            delivered.extend(rest);
        } else {
            self.reassembly.store(offset, data);
        }
        self.reassembly.drop_delivered_prefix(self.contiguous_rx_offset);
        delivered
    }

    pub fn shutdown(&mut self, flags: ShutdownFlags) {
        self.shutdown |= flags;
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.contains(ShutdownFlags::SHUT_RDWR)
    }

    /// Whether the stream has no rx gap before `last_rx_offset` and no
    /// unacked tx before `tx_offset` — the destroy precondition in §4.5's
    /// final step.
    pub fn ready_to_destroy(&self) -> bool {
        self.is_closed() && self.reassembly.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembler_drains_nothing_before_the_gap_closes() {
        let mut buf = Reassembler::new();
        buf.store(4, Bytes::from_static(b"defg"));
        let (rx_offset, chunks) = buf.drain_contiguous(0);
        assert_eq!(rx_offset, 0);
        assert!(chunks.is_empty());
    }

    #[test]
    fn stream_deliver_and_drain_reorders_to_a_single_contiguous_run() {
        let mut strm = Stream::new(3, 4096, 4096);
        let delivered = strm.deliver_and_drain(4, Bytes::from_static(b"efgh"));
        assert!(delivered.is_empty());
        assert_eq!(strm.rx_offset(), 0);

        let delivered = strm.deliver_and_drain(0, Bytes::from_static(b"abcd"));
        let joined: Vec<u8> = delivered.iter().flat_map(|c| c.to_vec()).collect();
        assert_eq!(joined, b"abcdefgh");
        assert_eq!(strm.rx_offset(), 8);
        assert!(strm.reassembly.is_empty());
    }

    #[test]
    fn stream_starts_with_zero_offsets() {
        let strm = Stream::new(3, 4096, 4096);
        assert_eq!(strm.tx_offset, 0);
        assert_eq!(strm.rx_offset(), 0);
        assert!(!strm.is_closed());
    }
}
