//! Embedder-supplied transport limits (§1.1 Configuration, §4.8, §6).
//!
//! Following the teacher's `connection::limits` pattern: a plain struct
//! validated and owned by the embedder at construction time rather than a
//! config-file/env-var layer, since this crate is a library.

/// Local or remote transport settings negotiated for a connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Settings {
    /// The highest stream id the holder of these settings permits the
    /// peer to open.
    pub max_stream_id: u32,
    /// Connection-wide receive window, in bytes.
    pub max_data: u64,
    /// Per-stream receive window, in bytes.
    pub max_stream_data: u64,
}

impl Settings {
    pub const fn new(max_stream_id: u32, max_data: u64, max_stream_data: u64) -> Self {
        Self {
            max_stream_id,
            max_data,
            max_stream_data,
        }
    }
}
