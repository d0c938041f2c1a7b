//! Packet header framing: long-form (handshake) and short-form (protected)
//! headers.
//!
//! Grounded on `s2n-quic-core::packet::{long, short}` (header-form bit,
//! long packet type field, connection id placement) but reduced to the
//! single 64-bit connection id and 32-bit version this transport's data
//! model names (§3, §4.4, §4.5, §6) rather than the RFC 9000 variable-length
//! dest/src connection id pair.

pub(crate) mod header;

pub use header::{Header, LongHeader, PacketType, ShortHeader};
