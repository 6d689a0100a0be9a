//! Fixed-capacity receive buffers, one per message-triggered role.
//!
//! Capacities are computed once at startup from the search configuration's
//! worst-case payload for the role's tag. An oversized arrival means the
//! sender and receiver were sized from different configurations; that is a
//! protocol violation and aborts the rank rather than truncating.

use rangier_transport::{Envelope, Rank};

/// A role's single in-flight receive slot.
///
/// Discipline: exactly one message may occupy the buffer at a time, and it
/// must be taken by the triggering step before the role is re-armed.
#[derive(Debug)]
pub struct RecvBuffer {
    capacity: usize,
    payload: Vec<u8>,
    sender: Rank,
    seq: u64,
    loaded: bool,
}

impl RecvBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            payload: Vec::with_capacity(capacity),
            sender: Rank(0),
            seq: 0,
            loaded: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Copy an arrived envelope into the buffer.
    ///
    /// # Panics
    /// Aborts on payload overflow (sender/receiver sizing mismatch) and on
    /// reload before the previous message was consumed.
    pub fn load(&mut self, envelope: &Envelope) {
        assert!(
            envelope.payload.len() <= self.capacity,
            "message of {} bytes from rank {} exceeds receive buffer capacity {} for tag {}",
            envelope.payload.len(),
            envelope.sender,
            self.capacity,
            envelope.tag,
        );
        assert!(
            !self.loaded,
            "receive buffer for tag {} reloaded before previous message was consumed",
            envelope.tag,
        );
        self.payload.clear();
        self.payload.extend_from_slice(&envelope.payload);
        self.sender = envelope.sender;
        self.seq = envelope.seq;
        self.loaded = true;
    }

    /// Consume the buffered message, freeing the slot for the next arrival.
    ///
    /// # Panics
    /// Aborts if no message is loaded — a role stepped without a trigger.
    pub fn take(&mut self) -> (Vec<u8>, Rank) {
        assert!(self.loaded, "receive buffer consumed while empty");
        self.loaded = false;
        (std::mem::take(&mut self.payload), self.sender)
    }

    /// Drop any buffered message without consuming it.
    pub fn reset(&mut self) {
        self.payload.clear();
        self.loaded = false;
    }
}
