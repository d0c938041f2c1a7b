//! The error taxonomy surfaced by the connection core.
//!
//! Modeled on `s2n-quic-core::connection::error::Error`: a single
//! `#[non_exhaustive]` enum with `displaydoc` messages and an optional
//! `thiserror::Error` derive behind the `thiserror` feature, so embedders
//! that want `std::error::Error` can opt in without forcing the dependency
//! on `no_std` consumers.

/// Errors the connection core can return from any fallible entry point.
///
/// See §7 for the fatal/transient/callback classification: [`Error::Proto`],
/// [`Error::FlowControl`], and [`Error::BadPacketHash`] are fatal and the
/// connection should be discarded; [`Error::NoBuf`], [`Error::StreamDataBlocked`],
/// and [`Error::NoMem`] are transient and retrying later can make progress;
/// [`Error::CallbackFailure`] is opaque and treated as fatal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, displaydoc::Display)]
#[non_exhaustive]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum Error {
    /// allocation failed
    NoMem,
    /// the output buffer is too small to hold anything
    NoBuf,
    /// a protocol violation was observed
    Proto,
    /// a flow-control limit was violated
    FlowControl,
    /// the stream id is already in use
    StreamInUse,
    /// the stream id is blocked by the peer's stream-id limit
    StreamIdBlocked,
    /// the stream is blocked by its flow-control window
    StreamDataBlocked,
    /// an argument supplied by the caller was invalid
    InvalidArgument,
    /// the operation is not valid in the connection's current state
    InvalidState,
    /// the packet's integrity tag did not verify
    BadPacketHash,
    /// an application callback returned failure
    CallbackFailure,
}

impl Error {
    /// Whether this error is a fatal protocol-level error: the connection
    /// must be discarded and no further progress is possible (§7).
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Error::Proto | Error::FlowControl | Error::BadPacketHash | Error::CallbackFailure
        )
    }

    /// Whether this error is transient: re-invoking later (larger buffer,
    /// more flow-control credit) may make progress (§7).
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Error::NoBuf | Error::StreamDataBlocked | Error::NoMem
        )
    }
}

pub type Result<T> = core::result::Result<T, Error>;
