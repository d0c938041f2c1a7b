//! Ordered set of received packet numbers awaiting acknowledgment, plus
//! the delayed-ack timer (§4.2).
//!
//! Grounded on `s2n-quic-transport`'s ack set (an ordered collection keyed
//! by packet number) but realized here as a `BTreeMap` rather than an
//! interval set, since the Connection Core only needs descending iteration
//! to assemble an ACK frame, not interval compression.

use crate::frame::{Ack, AckBlock, MAX_ACK_BLOCKS, MAX_ACK_GAP};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::time::Duration;

/// A received-packet record: packet number and receive timestamp (§3).
pub type Timestamp = Duration;

#[derive(Debug, Default)]
pub struct AckTracker {
    entries: BTreeMap<u64, Timestamp>,
    next_ack_expiry: Option<Timestamp>,
}

/// Delayed-ack timer: how long after the first pending packet we wait
/// before an ACK-only packet is worth sending on its own.
pub const DELAYED_ACK_TIMEOUT: Duration = Duration::from_millis(25);

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `pkt_num` as pending acknowledgment. Idempotent: acking an
    /// already-tracked packet number a second time is a no-op.
    pub fn add(&mut self, pkt_num: u64, now: Timestamp) {
        if self.entries.is_empty() {
            self.next_ack_expiry = Some(now + DELAYED_ACK_TIMEOUT);
        }
        self.entries.entry(pkt_num).or_insert(now);
    }

    pub fn next_ack_expiry(&self) -> Option<Timestamp> {
        self.next_ack_expiry
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Assembles an ACK frame covering as many tracked packet numbers as
    /// fit within [`MAX_ACK_BLOCKS`]/[`MAX_ACK_GAP`], coalescing runs of
    /// consecutive packet numbers, and removes the covered entries from
    /// the tracker (§4.2).
    pub fn assemble(&mut self, now: Timestamp) -> Option<Ack> {
        let (&largest_ack, &largest_ts) = self.entries.iter().next_back()?;

        // Partition the tracked packet numbers into maximal descending
        // runs of consecutive values: [run_largest, run_smallest].
        let mut runs: Vec<(u64, u64)> = Vec::new();
        let mut covered = vec![largest_ack];
        {
            let mut run_largest = largest_ack;
            let mut run_smallest = largest_ack;
            for (&pkt_num, _) in self.entries.range(..largest_ack).rev() {
                if pkt_num + 1 == run_smallest {
                    run_smallest = pkt_num;
                } else {
                    runs.push((run_largest, run_smallest));
                    run_largest = pkt_num;
                    run_smallest = pkt_num;
                }
                covered.push(pkt_num);
            }
            runs.push((run_largest, run_smallest));
        }

        let first_ack_blklen = largest_ack - runs[0].1;
        let mut blocks: SmallVec<[AckBlock; 4]> = SmallVec::new();
        let mut prev_smallest = runs[0].1;
        for &(run_largest, run_smallest) in &runs[1..] {
            let gap = prev_smallest - run_largest - 1;
            let blklen = run_largest - run_smallest;
            if gap > MAX_ACK_GAP as u64 || blocks.len() >= MAX_ACK_BLOCKS {
                break;
            }
            blocks.push(AckBlock {
                gap: gap as u8,
                blklen,
            });
            prev_smallest = run_smallest;
        }

        let ack_delay = now.saturating_sub(largest_ts).as_millis() as u64;

        for pkt_num in covered {
            self.entries.remove(&pkt_num);
        }
        if self.entries.is_empty() {
            self.next_ack_expiry = None;
        }

        Some(Ack {
            largest_ack,
            ack_delay,
            first_ack_blklen,
            blocks,
        })
    }
}
