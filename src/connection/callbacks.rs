//! Embedder callbacks consumed by the core (§6).
//!
//! Grounded on `s2n-quic-core::crypto`/`s2n-quic-core::connection` trait
//! boundaries: the core calls out for anything cryptographic, anything
//! TLS-shaped, and anything merely observational, and owns no policy of
//! its own over any of it.

use crate::error::Result;
use bytes::Bytes;

/// Key material for one direction of traffic (§3: `tx_ckm`/`rx_ckm`).
/// The core only stores and forwards this; the AEAD itself lives behind
/// [`Callbacks::encrypt`]/[`Callbacks::decrypt`].
#[derive(Debug, Clone)]
pub struct Keys {
    pub key: Bytes,
    pub iv: u64,
}

impl Keys {
    pub fn new(key: Bytes, iv: u64) -> Self {
        Self { key, iv }
    }

    /// Nonce for `pkt_num`, derived by XORing the stored IV with the
    /// packet number (§4.4, §4.5).
    pub fn nonce(&self, pkt_num: u64) -> u64 {
        self.iv ^ pkt_num
    }
}

/// Everything the Connection Core asks the embedder to do on its behalf.
///
/// Every method may fail; a failure is surfaced to the caller as
/// [`Error::CallbackFailure`] and treated as fatal (§5 Cancellation, §7).
pub trait Callbacks {
    /// Produces the first handshake chunk and the starting packet number
    /// for a client's `CLIENT_INITIAL` packet.
    fn send_client_initial(&mut self) -> Result<(u64, Bytes)>;

    /// Produces further cleartext handshake bytes from the client. An
    /// empty return means there is nothing more to send right now.
    fn send_client_cleartext(&mut self) -> Result<Bytes>;

    /// Produces cleartext handshake bytes from the server. `initial`
    /// distinguishes the first `SERVER_CLEARTEXT` packet (which also
    /// supplies the starting packet number) from subsequent ones.
    fn send_server_cleartext(&mut self, initial: bool, pkt_num: &mut Option<u64>) -> Result<Bytes>;

    /// Delivers contiguous stream-0 (handshake) bytes to the application.
    fn recv_handshake_data(&mut self, data: &[u8]) -> Result<()>;

    /// Notifies the application that the handshake has completed.
    fn handshake_completed(&mut self) -> Result<()>;

    /// AEAD-seals `plaintext` into `out`, returning the number of bytes
    /// written (the sealed length, including any authentication tag).
    fn encrypt(&mut self, out: &mut [u8], plaintext: &[u8], key: &[u8], nonce: u64, aad: &[u8]) -> Result<usize>;

    /// AEAD-opens `ciphertext` into `out` in place, returning the
    /// plaintext length.
    fn decrypt(&mut self, out: &mut [u8], ciphertext: &[u8], key: &[u8], nonce: u64, aad: &[u8]) -> Result<usize>;

    /// Delivers reassembled, contiguous stream data to the application.
    fn recv_stream_data(&mut self, _stream_id: u32, _fin: bool, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Observes every packet received, before frame dispatch.
    fn recv_pkt(&mut self, _pkt_num: u64) {}

    /// Observes every frame received.
    fn recv_frame(&mut self, _pkt_num: u64, _frame: &crate::frame::Frame) {}

    /// Observes every packet sent.
    fn send_pkt(&mut self, _pkt_num: u64) {}

    /// Observes every frame sent.
    fn send_frame(&mut self, _pkt_num: u64, _frame: &crate::frame::Frame) {}

    /// Observes an offered-version list from a version-negotiation packet
    /// (surfaced only; no action taken by the core — explicit Non-goal).
    fn recv_version_negotiation(&mut self, _versions: &[u32]) {}
}
