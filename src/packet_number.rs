//! Packet-number truncation and reconstruction.
//!
//! Grounded on `s2n-quic-core::packet::number` (which carries a much richer
//! multi-space packet number), simplified to this transport's single
//! connection-wide packet-number sequence — the shape `original_source`'s
//! `ngtcp2_pkt_adjust_pkt_num` assumes.

/// The width, in bits, a packet number was truncated to on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Width {
    Bits8,
    Bits16,
    Bits32,
}

impl Width {
    pub const fn bits(self) -> u32 {
        match self {
            Width::Bits8 => 8,
            Width::Bits16 => 16,
            Width::Bits32 => 32,
        }
    }

    /// Truncates a full 64-bit packet number down to this width for
    /// on-the-wire encoding.
    pub const fn truncate(self, pkt_num: u64) -> u64 {
        pkt_num & mask(self.bits())
    }
}

const fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Reconstructs a full 64-bit packet number from its truncated wire form,
/// given the largest packet number received so far on this connection.
///
/// This is the nearest-in-window rule: among all 64-bit values whose low
/// `width` bits equal `truncated`, pick the one closest to `expected`
/// (ties broken towards the smaller candidate, matching the reference
/// algorithm in `original_source`). Property: for any `expected` and any
/// `truncated = N & mask`, `adjust(expected, truncated, width)` returns the
/// `N'` closest to `expected` with `N' & mask == truncated` (§8 property 5).
pub fn adjust(expected: u64, truncated: u64, width: Width) -> u64 {
    let bits = width.bits();
    let win = 1u128 << bits;
    let hwin = win / 2;
    let mask = (win - 1) as u64;

    let candidate = (expected & !mask) | (truncated & mask);
    let candidate = candidate as u128;
    let expected = expected as u128;

    if candidate + hwin <= expected && candidate + win < (u64::MAX as u128) {
        (candidate + win) as u64
    } else if candidate > expected + hwin && candidate >= win {
        (candidate - win) as u64
    } else {
        candidate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_half_window() {
        for width in [Width::Bits8, Width::Bits16, Width::Bits32] {
            let expected = 1_000_000u64;
            for delta in -5i64..=5 {
                let n = (expected as i64 + delta) as u64;
                let truncated = width.truncate(n);
                assert_eq!(adjust(expected, truncated, width), n);
            }
        }
    }

    #[test]
    fn wraps_forward_across_window_boundary() {
        // truncated value just past the top of the 8-bit window from `expected`
        let expected = 255u64;
        let truncated = 0u64; // represents 256 on the wire
        assert_eq!(adjust(expected, truncated, Width::Bits8), 256);
    }

    #[test]
    fn wraps_backward_across_window_boundary() {
        let expected = 256u64;
        let truncated = 0xffu64; // represents 255
        assert_eq!(adjust(expected, truncated, Width::Bits8), 255);
    }

    #[test]
    fn adjust_matches_nearest_in_window_property() {
        use bolero::{check, generator::*};
        check!()
            .with_type::<(u64, u64, u8)>()
            .cloned()
            .for_each(|(expected, n, width_selector)| {
                let width = match width_selector % 3 {
                    0 => Width::Bits8,
                    1 => Width::Bits16,
                    _ => Width::Bits32,
                };
                let truncated = width.truncate(n);
                let result = adjust(expected, truncated, width);
                assert_eq!(width.truncate(result), truncated);

                let hwin = (1i128 << width.bits()) / 2;
                assert!((result as i128 - expected as i128).abs() <= hwin);
            });
    }
}
