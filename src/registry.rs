//! Stream Registry: creates, finds, and destroys streams; enforces
//! peer-initiated stream id limits and open-id bookkeeping (§4.8, §9.1).
//!
//! Grounded on `s2n-quic-transport::stream::manager` (a map from stream id
//! to stream state plus an id-allocator) but trimmed to exactly the
//! admission rules this spec names: parity-based locality, a translated id
//! space for duplicate/reopen detection, and silent-ignore of frames for
//! already-closed peer streams.

use crate::error::{Error, Result};
use crate::stream::Stream;
use hashbrown::{HashMap, HashSet};

/// Which side of the connection this registry belongs to; determines
/// which stream id parity is locally initiated (§3, §9.1).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// `conn_local_stream(id)`: server ⇒ even ids are locally initiated;
/// client ⇒ odd ids are. Stream 0 (the handshake stream) is exempt (§9.1).
pub fn conn_local_stream(role: Role, id: u32) -> bool {
    if id == 0 {
        return false;
    }
    match role {
        Role::Server => id % 2 == 0,
        Role::Client => id % 2 != 0,
    }
}

/// `id_from_stream_id(id)`: translates a wire stream id into the
/// allocator's dense id space (§3, §9.1).
pub fn id_from_stream_id(id: u32) -> u32 {
    if id % 2 != 0 {
        (id - 1) / 2
    } else {
        (id - 2) / 2
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum OpenOutcome {
    Opened,
    AlreadyOpen,
    AlreadyClosed,
}

/// Tracks which translated peer-initiated ids have been opened and which
/// have since been closed, so a frame referencing a reused, already-closed
/// id can be silently ignored rather than reopening a destroyed stream
/// (§4.8).
#[derive(Debug, Default)]
struct IdTracker {
    max_opened: Option<u32>,
    closed: HashSet<u32>,
}

impl IdTracker {
    fn open(&mut self, id: u32) -> OpenOutcome {
        if self.closed.contains(&id) {
            return OpenOutcome::AlreadyClosed;
        }
        match self.max_opened {
            Some(max) if id <= max => OpenOutcome::AlreadyOpen,
            _ => {
                self.max_opened = Some(id);
                OpenOutcome::Opened
            }
        }
    }

    fn close(&mut self, id: u32) {
        self.closed.insert(id);
    }
}

#[derive(Debug)]
pub struct StreamRegistry {
    role: Role,
    streams: HashMap<u32, Stream>,
    remote_idtr: IdTracker,
    /// The highest id we have advertised to the peer via MAX_STREAM_ID
    /// (§4.4 step 2); raw wire-id space, not translated.
    pub local_max_stream_id: u32,
    /// The ceiling we are willing to grant next, advanced by 2 each time a
    /// peer-initiated stream is destroyed (§3, §9.1).
    pub max_remote_stream_id: u32,
    /// The limit the peer granted us for locally-initiated streams (§4.8).
    pub remote_max_stream_id: u32,
}

impl StreamRegistry {
    pub fn new(role: Role, local_max_stream_id: u32, remote_max_stream_id: u32) -> Self {
        Self {
            role,
            streams: HashMap::new(),
            remote_idtr: IdTracker::default(),
            local_max_stream_id,
            max_remote_stream_id: local_max_stream_id,
            remote_max_stream_id,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn find(&self, id: u32) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn find_mut(&mut self, id: u32) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stream> {
        self.streams.values_mut()
    }

    /// Opens a locally-initiated stream with an explicit id (§4.8:
    /// `open_stream`).
    pub fn open_stream(
        &mut self,
        id: u32,
        initial_max_rx: u64,
        initial_max_tx: u64,
    ) -> Result<&mut Stream> {
        if !conn_local_stream(self.role, id) {
            return Err(Error::InvalidArgument);
        }
        if id > self.remote_max_stream_id {
            return Err(Error::StreamIdBlocked);
        }
        if self.streams.contains_key(&id) {
            return Err(Error::StreamInUse);
        }
        self.streams.insert(id, Stream::new(id, initial_max_rx, initial_max_tx));
        Ok(self.streams.get_mut(&id).expect("just inserted"))
    }

    /// Admits a peer-initiated stream on first frame receipt, or returns
    /// the already-registered stream. Returns `Ok(None)` for the
    /// documented silent-ignore case: a frame addressed to a translated id
    /// that was previously opened and destroyed (§4.5, §4.8).
    pub fn admit_peer_stream(
        &mut self,
        id: u32,
        initial_max_rx: u64,
        initial_max_tx: u64,
    ) -> Result<Option<&mut Stream>> {
        if id != 0 && !conn_local_stream(self.role, id) && id > self.local_max_stream_id {
            return Err(Error::Proto);
        }
        if self.streams.contains_key(&id) {
            return Ok(self.streams.get_mut(&id));
        }
        if id != 0 {
            let translated = id_from_stream_id(id);
            if self.remote_idtr.open(translated) == OpenOutcome::AlreadyClosed {
                return Ok(None);
            }
        }
        self.streams.insert(id, Stream::new(id, initial_max_rx, initial_max_tx));
        Ok(self.streams.get_mut(&id))
    }

    /// Destroys a stream, cascading the id-space bookkeeping for
    /// peer-initiated ids (§3, §9.1: `max_remote_stream_id += 2`,
    /// saturating).
    pub fn close_stream(&mut self, id: u32) {
        self.streams.remove(&id);
        if id != 0 && !conn_local_stream(self.role, id) {
            self.remote_idtr.close(id_from_stream_id(id));
            self.max_remote_stream_id = self
                .max_remote_stream_id
                .saturating_add(2)
                .min(u32::MAX - 2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_determines_locality() {
        assert!(conn_local_stream(Role::Server, 2));
        assert!(!conn_local_stream(Role::Server, 3));
        assert!(conn_local_stream(Role::Client, 3));
        assert!(!conn_local_stream(Role::Client, 2));
        assert!(!conn_local_stream(Role::Server, 0));
        assert!(!conn_local_stream(Role::Client, 0));
    }

    #[test]
    fn id_translation_matches_reference() {
        assert_eq!(id_from_stream_id(1), 0);
        assert_eq!(id_from_stream_id(3), 1);
        assert_eq!(id_from_stream_id(2), 0);
        assert_eq!(id_from_stream_id(4), 1);
    }

    #[test]
    fn reused_closed_peer_stream_id_is_silently_ignored() {
        let mut reg = StreamRegistry::new(Role::Server, 10, 10);
        reg.admit_peer_stream(3, 4096, 4096).unwrap();
        reg.close_stream(3);
        let result = reg.admit_peer_stream(3, 4096, 4096).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn duplicate_local_open_is_rejected() {
        let mut reg = StreamRegistry::new(Role::Server, 10, 10);
        reg.open_stream(2, 4096, 4096).unwrap();
        let err = reg.open_stream(2, 4096, 4096).unwrap_err();
        assert_eq!(err, Error::StreamInUse);
    }
}
