//! Connection-core state machine for an early-draft QUIC transport.
//!
//! This crate owns everything that lives below the handshake/application
//! boundary for a single connection: the packet assembler and ingestor, the
//! retransmission buffer, the delayed-ack tracker, per-stream flow control
//! and reassembly, and the stream-id registry. It does not own sockets,
//! timers, or cryptography; those are supplied by the embedder through
//! [`connection::Callbacks`].
//!
//! Grounded on `s2n-quic-transport`'s split between a core state machine and
//! an embedder-supplied I/O/crypto boundary, scaled down to the single-file
//! component list this transport's connection core describes.

pub mod ack_tracker;
pub mod connection;
pub mod error;
pub mod flow;
pub mod frame;
pub mod frame_queue;
pub mod packet;
pub mod packet_number;
pub mod registry;
pub mod rtb;
pub mod stream;

pub use connection::{Callbacks, Connection, Keys, Settings, State};
pub use error::{Error, Result};
