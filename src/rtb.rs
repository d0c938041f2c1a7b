//! Retransmission Buffer: packets in flight, kept until acknowledged or
//! retransmitted (§4.3).
//!
//! Grounded on `s2n-quic-transport::recovery::sent_packets` (a structure
//! keyed by packet number that must also be walkable in expiry order) but
//! realized with the standard lazy-deletion priority-queue pattern: a
//! `BinaryHeap` of `(expiry, pkt_num)` keys for O(log n) soonest-expiry
//! access, plus a `HashMap` owning the actual entries, since neither
//! `BinaryHeap` nor `HashMap` alone supports both access patterns this
//! component needs.

use crate::frame::{Ack, Frame};
use hashbrown::HashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

pub type Timestamp = Duration;

/// Fixed expiry used for every RTB entry (§3, §4.4 step 6); there is no
/// RTT-based loss detection in this core (explicit Non-goal).
pub const INITIAL_EXPIRY: Duration = Duration::from_millis(500);

/// Which wire form an RTB entry must be re-emitted as on retransmit: most
/// entries carry frames sealed into a protected short-header packet, but a
/// `CLIENT_INITIAL` (§4.4 step 6, §8 scenario 1) predates the handshake and
/// has no tx keys to seal with, so it is re-emitted as another unprotected
/// `CLIENT_INITIAL` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtbPacketKind {
    #[default]
    Protected,
    ClientInitial,
}

/// An in-flight packet record: its frame chain and expiry (§3).
#[derive(Debug, Clone)]
pub struct RtbEntry {
    pub pkt_num: u64,
    pub expiry: Timestamp,
    pub frames: Vec<Frame>,
    pub kind: RtbPacketKind,
}

#[derive(Debug, Default)]
pub struct Rtb {
    heap: BinaryHeap<Reverse<(Timestamp, u64)>>,
    entries: HashMap<u64, RtbEntry>,
}

impl Rtb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: RtbEntry) {
        self.heap.push(Reverse((entry.expiry, entry.pkt_num)));
        self.entries.insert(entry.pkt_num, entry);
    }

    fn drop_stale_heap_top(&mut self) {
        while let Some(Reverse((_, pkt_num))) = self.heap.peek() {
            if self.entries.contains_key(pkt_num) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Returns the soonest-expiring live entry without removing it.
    pub fn top(&mut self) -> Option<&RtbEntry> {
        self.drop_stale_heap_top();
        let Reverse((_, pkt_num)) = self.heap.peek()?;
        self.entries.get(pkt_num)
    }

    /// Removes and returns the soonest-expiring live entry.
    pub fn pop(&mut self) -> Option<RtbEntry> {
        self.drop_stale_heap_top();
        let Reverse((_, pkt_num)) = self.heap.pop()?;
        self.entries.remove(&pkt_num)
    }

    pub fn remove(&mut self, pkt_num: u64) -> Option<RtbEntry> {
        self.entries.remove(&pkt_num)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn earliest_expiry(&self) -> Option<Timestamp> {
        self.entries.values().map(|e| e.expiry).min()
    }

    /// Walks the ack frame's covered packet numbers and frees matching
    /// entries (§4.3, §4.5 step 3).
    pub fn recv_ack(&mut self, ack: &Ack) {
        for pkt_num in ack.packet_numbers() {
            self.entries.remove(&pkt_num);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    #[test]
    fn pop_returns_non_decreasing_expiry() {
        let mut rtb = Rtb::new();
        rtb.add(RtbEntry {
            pkt_num: 2,
            expiry: Duration::from_millis(300),
            frames: vec![],
            kind: RtbPacketKind::Protected,
        });
        rtb.add(RtbEntry {
            pkt_num: 1,
            expiry: Duration::from_millis(100),
            frames: vec![],
            kind: RtbPacketKind::Protected,
        });
        rtb.add(RtbEntry {
            pkt_num: 3,
            expiry: Duration::from_millis(200),
            frames: vec![],
            kind: RtbPacketKind::Protected,
        });

        let mut last = Duration::from_millis(0);
        while let Some(entry) = rtb.pop() {
            assert!(entry.expiry >= last);
            last = entry.expiry;
        }
    }

    #[test]
    fn recv_ack_frees_covered_entries() {
        let mut rtb = Rtb::new();
        rtb.add(RtbEntry {
            pkt_num: 10,
            expiry: Duration::from_millis(100),
            frames: vec![],
            kind: RtbPacketKind::Protected,
        });
        rtb.add(RtbEntry {
            pkt_num: 11,
            expiry: Duration::from_millis(100),
            frames: vec![],
            kind: RtbPacketKind::Protected,
        });
        let ack = Ack {
            largest_ack: 11,
            ack_delay: 0,
            first_ack_blklen: 1,
            blocks: SmallVec::new(),
        };
        rtb.recv_ack(&ack);
        assert!(rtb.is_empty());
    }

    #[test]
    fn stale_heap_entries_are_skipped() {
        let mut rtb = Rtb::new();
        rtb.add(RtbEntry {
            pkt_num: 1,
            expiry: Duration::from_millis(100),
            frames: vec![],
            kind: RtbPacketKind::Protected,
        });
        rtb.add(RtbEntry {
            pkt_num: 2,
            expiry: Duration::from_millis(200),
            frames: vec![],
            kind: RtbPacketKind::Protected,
        });
        rtb.remove(1);
        let top = rtb.top().unwrap();
        assert_eq!(top.pkt_num, 2);
    }
}
