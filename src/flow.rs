//! The split-offset flow-control arithmetic (§4.7).
//!
//! Connection-wide byte offsets are tracked as a `(high, low)` pair where
//! `low` counts bytes modulo 1024 and `high` counts whole kibibytes; the
//! effective 64-bit offset is `high * 1024 + low`. This mirrors the wire's
//! `MAX_DATA` units of kibibytes directly (see Design Notes in
//! SPEC_FULL.md) and must not be normalized away even though it reads as
//! an odd representation for a plain byte counter.

/// A connection- or stream-wide byte offset, split into kibibyte/byte parts.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SplitOffset {
    pub high: u64,
    pub low: u32,
}

impl SplitOffset {
    pub const fn new(high: u64, low: u32) -> Self {
        Self { high, low }
    }

    /// The effective 64-bit byte offset, saturating at `u64::MAX`.
    pub const fn as_u64(self) -> u64 {
        match self.high.checked_mul(1024) {
            Some(base) => base.saturating_add(self.low as u64),
            None => u64::MAX,
        }
    }

    /// Advances this offset by `datalen` bytes, saturating at `u64::MAX`
    /// (represented as `high = u64::MAX, low = 1023`).
    ///
    /// Ported directly from `ngtcp2_increment_offset` in `original_source`:
    /// `datalen` is split into whole-kibibyte and remainder parts, the
    /// remainder is added to `low` and may carry one kibibyte into `high`.
    pub fn increment(&mut self, datalen: u64) {
        let datalen_high = datalen / 1024;
        let datalen_low = (datalen % 1024) as u32;

        if self.high > u64::MAX - datalen_high {
            self.high = u64::MAX;
            self.low = 0x3ff;
            return;
        }

        self.high += datalen_high;
        self.low += datalen_low;

        if self.low <= 0x3ff {
            return;
        }

        if self.high == u64::MAX {
            self.low = 0x3ff;
            return;
        }

        self.low &= 0x3ff;
        self.high += 1;
    }

    /// Returns `true` if receiving `datalen` additional bytes on top of this
    /// offset would exceed `max`'s `high` component (§4.7's
    /// `conn_max_data_violated`, applied generically to any split-offset
    /// budget, not only the connection-wide one).
    ///
    /// Only `max.high` participates: the wire's `MAX_DATA`/`MAX_STREAM_DATA`
    /// credit is granted in whole kibibytes, so the budget is exactly
    /// `max.high` kibibytes regardless of `max.low`.
    pub fn would_violate(self, datalen: u64, max_high: u64) -> bool {
        let left_high = max_high - self.high;
        let low = self.low as u64 + datalen;
        let from_low = low / 1024;

        if left_high == from_low {
            (low & 0x3ff) > 0
        } else {
            left_high < from_low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_matches_reference_arithmetic() {
        let mut o = SplitOffset::new(2, 900);
        o.increment(200);
        // 900 + 200 = 1100 -> carries 1 into high, remainder 76
        assert_eq!(o, SplitOffset::new(3, 76));
        assert_eq!(o.as_u64(), 3 * 1024 + 76);
    }

    #[test]
    fn increment_saturates_at_u64_max() {
        let mut o = SplitOffset::new(u64::MAX, 0);
        o.increment(1);
        assert_eq!(o, SplitOffset::new(u64::MAX, 0x3ff));
        assert_eq!(o.as_u64(), u64::MAX);
    }

    #[test]
    fn increment_property_matches_decoded_sum() {
        // property 6: increment(h, l, n) then decoding equals
        // min(UINT64_MAX, (h*1024 + l) + n), modulo the kibibyte rounding
        // the wire format imposes on `n` itself.
        let mut o = SplitOffset::new(0, 0);
        let before = o.as_u64();
        o.increment(5000);
        let expected = (before + 5000).min(u64::MAX);
        // increment rounds datalen into (high, low) parts exactly, so the
        // decoded value matches the straightforward sum here since there's
        // no pre-existing `low` remainder to interact with.
        assert_eq!(o.as_u64(), expected);
    }

    #[test]
    fn would_violate_exact_boundary() {
        let window = SplitOffset::new(0, 1020); // max_rx_offset = 1024
        assert!(!window.would_violate(4, 1));
        assert!(window.would_violate(8, 1));
    }
}
