//! The Connection Core: owns every other component and drives the
//! handshake/post-handshake state machine (§2, §4.6).
//!
//! Grounded on `s2n-quic-transport::connection::ConnectionImpl` for the
//! overall shape (one struct owning all per-connection state, `send`/`recv`
//! as the two driving entry points) but scoped to exactly the fields this
//! spec's data model names (§3).

pub mod callbacks;
pub mod settings;
mod state;

mod assembler;
mod ingestor;

#[cfg(test)]
mod tests;

pub use callbacks::{Callbacks, Keys};
pub use settings::Settings;
pub use state::State;

use crate::ack_tracker::AckTracker;
use crate::error::{Error, Result};
use crate::flow::SplitOffset;
use crate::frame_queue::FrameQueue;
use crate::registry::{Role, StreamRegistry};
use crate::rtb::Rtb;
use crate::stream::Stream;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;

/// Received protected packets buffered while the handshake is still in
/// progress, replayed once it completes (§4.6, §5).
pub const MAX_BUFFERED_RX_PACKETS: usize = 16;

pub struct Connection<C: Callbacks> {
    pub(crate) role: Role,
    pub conn_id: u64,
    pub version: u32,
    pub(crate) state: State,

    pub(crate) registry: StreamRegistry,
    pub(crate) rtb: Rtb,
    pub(crate) ack_tracker: AckTracker,
    pub(crate) frame_queue: FrameQueue,
    /// Streams whose rx credit window has shrunk past half and are owed a
    /// MAX_STREAM_DATA frame (§4.7, §9 Decision: index-keyed queue rather
    /// than an intrusive list).
    pub(crate) fc_pending: VecDeque<u32>,

    pub(crate) next_tx_pkt_num: u64,
    pub(crate) max_rx_pkt_num: u64,

    pub(crate) rx_offset: SplitOffset,
    pub(crate) max_rx_offset: SplitOffset,
    pub(crate) unsent_max_rx_offset: SplitOffset,
    pub(crate) tx_offset: SplitOffset,
    pub(crate) max_tx_offset_high: u64,

    pub(crate) local_settings: Settings,
    pub(crate) remote_settings: Settings,

    pub(crate) tx_keys: Option<Keys>,
    pub(crate) rx_keys: Option<Keys>,

    pub(crate) buffered_rx_packets: VecDeque<Bytes>,

    pub callbacks: C,
}

impl<C: Callbacks> Connection<C> {
    fn new(role: Role, conn_id: u64, version: u32, local_settings: Settings, remote_settings: Settings, callbacks: C) -> Self {
        let initial_state = match role {
            Role::Client => State::ClientInitial,
            Role::Server => State::ServerInitial,
        };
        let max_rx_offset = SplitOffset::new(local_settings.max_data / 1024, 0);
        Self {
            role,
            conn_id,
            version,
            state: initial_state,
            registry: StreamRegistry::new(role, local_settings.max_stream_id, remote_settings.max_stream_id),
            rtb: Rtb::new(),
            ack_tracker: AckTracker::new(),
            frame_queue: FrameQueue::new(),
            fc_pending: VecDeque::new(),
            next_tx_pkt_num: 0,
            max_rx_pkt_num: 0,
            rx_offset: SplitOffset::default(),
            max_rx_offset,
            unsent_max_rx_offset: max_rx_offset,
            tx_offset: SplitOffset::default(),
            max_tx_offset_high: remote_settings.max_data / 1024,
            local_settings,
            remote_settings,
            tx_keys: None,
            rx_keys: None,
            buffered_rx_packets: VecDeque::new(),
            callbacks,
        }
    }

    pub fn new_client(conn_id: u64, version: u32, local_settings: Settings, remote_settings: Settings, callbacks: C) -> Self {
        Self::new(Role::Client, conn_id, version, local_settings, remote_settings, callbacks)
    }

    pub fn new_server(conn_id: u64, version: u32, local_settings: Settings, remote_settings: Settings, callbacks: C) -> Self {
        Self::new(Role::Server, conn_id, version, local_settings, remote_settings, callbacks)
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn take_pkt_num(&mut self) -> u64 {
        let pkt_num = self.next_tx_pkt_num;
        self.next_tx_pkt_num += 1;
        pkt_num
    }

    pub fn open_stream(&mut self, id: u32) -> Result<&mut Stream> {
        self.registry
            .open_stream(id, self.local_settings.max_stream_data, self.remote_settings.max_stream_data)
    }

    pub fn find_stream(&self, id: u32) -> Option<&Stream> {
        self.registry.find(id)
    }

    pub fn find_stream_mut(&mut self, id: u32) -> Option<&mut Stream> {
        self.registry.find_mut(id)
    }

    pub fn close_stream(&mut self, id: u32) {
        self.registry.close_stream(id);
        self.fc_pending.retain(|&sid| sid != id);
    }

    /// The application's cue that connection-wide rx data has been
    /// consumed; advances the announced (not yet committed) rx credit
    /// (§4.7: `extend_max_offset`).
    pub fn extend_max_offset(&mut self, delta: u64) {
        self.unsent_max_rx_offset.increment(delta);
    }

    /// Same, for a single stream's rx credit (§4.7, §6).
    pub fn extend_max_stream_offset(&mut self, id: u32, delta: u64) -> Result<()> {
        let pending_needed = {
            let strm = self.registry.find_mut(id).ok_or(Error::InvalidArgument)?;
            strm.unsent_max_rx_offset = strm.unsent_max_rx_offset.saturating_add(delta);
            let grown_past_half = strm
                .unsent_max_rx_offset
                .saturating_sub(strm.max_rx_offset)
                > self.local_settings.max_stream_data / 2;
            grown_past_half && !strm.fc_pending
        };
        if pending_needed {
            let strm = self.registry.find_mut(id).expect("checked above");
            strm.fc_pending = true;
            self.fc_pending.push_back(id);
        }
        Ok(())
    }

    pub fn set_remote_transport_params(&mut self, settings: Settings) {
        self.remote_settings = settings;
        self.registry.remote_max_stream_id = settings.max_stream_id;
        self.max_tx_offset_high = settings.max_data / 1024;
    }

    pub fn get_local_transport_params(&self) -> Settings {
        self.local_settings
    }

    /// One-shot: fails if keys for this direction were already installed
    /// (§6: `update_tx_keys`/`update_rx_keys`).
    pub fn update_tx_keys(&mut self, key: Bytes, iv: u64) -> Result<()> {
        if self.tx_keys.is_some() {
            return Err(Error::InvalidState);
        }
        self.tx_keys = Some(Keys::new(key, iv));
        Ok(())
    }

    pub fn update_rx_keys(&mut self, key: Bytes, iv: u64) -> Result<()> {
        if self.rx_keys.is_some() {
            return Err(Error::InvalidState);
        }
        self.rx_keys = Some(Keys::new(key, iv));
        Ok(())
    }

    /// The next deadline this connection cares about, so the embedder can
    /// arm a single timer (§5).
    pub fn earliest_expiry(&self) -> Option<Duration> {
        match (self.ack_tracker.next_ack_expiry(), self.rtb.earliest_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    fn conn_should_send_max_data(&self) -> bool {
        self.max_rx_offset
            .high
            .saturating_sub(self.rx_offset.high)
            <= self.local_settings.max_data / 1024 / 2
    }
}
