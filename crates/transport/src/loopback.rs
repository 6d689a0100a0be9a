use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Mutex;

use tracing::trace;

use crate::envelope::{Envelope, Rank};
use crate::error::TransportError;
use crate::traits::Transport;

/// Tag ceiling for the loopback transport.
///
/// Matches the minimum tag upper bound an MPI implementation must provide,
/// so tag budgets proven against loopback hold on real clusters too.
pub const LOOPBACK_MAX_TAG: u32 = 32_767;

/// In-process cluster of connected [`LoopbackEndpoint`]s.
///
/// Every rank holds a sender to every other rank; each pairwise channel is a
/// `std::sync::mpsc` queue, so per-sender FIFO delivery holds by
/// construction. Used by tests and single-host runs.
pub struct LoopbackCluster;

impl LoopbackCluster {
    /// Build `size` connected endpoints, one per rank.
    pub fn new(size: u32) -> Vec<LoopbackEndpoint> {
        let mut senders = Vec::with_capacity(size as usize);
        let mut receivers = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let (tx, rx) = mpsc::channel();
            senders.push(tx);
            receivers.push(rx);
        }

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| LoopbackEndpoint {
                rank: Rank(rank as u32),
                size,
                peers: senders.clone(),
                inbox: Mutex::new(rx),
                next_seq: AtomicU64::new(0),
            })
            .collect()
    }
}

/// One rank's endpoint in a [`LoopbackCluster`].
pub struct LoopbackEndpoint {
    rank: Rank,
    size: u32,
    peers: Vec<Sender<Envelope>>,
    inbox: Mutex<Receiver<Envelope>>,
    next_seq: AtomicU64,
}

impl Transport for LoopbackEndpoint {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn max_tag(&self) -> u32 {
        LOOPBACK_MAX_TAG
    }

    fn send(&self, to: Rank, mut envelope: Envelope) -> Result<(), TransportError> {
        let peer = self
            .peers
            .get(to.index())
            .ok_or(TransportError::RankOutOfRange(to, self.size))?;

        envelope.sender = self.rank;
        envelope.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        trace!(from = %self.rank, %to, tag = envelope.tag, seq = envelope.seq, "loopback send");

        peer.send(envelope).map_err(|_| TransportError::Closed(to))
    }

    fn try_recv(&self) -> Result<Option<Envelope>, TransportError> {
        let inbox = self.inbox.lock().expect("loopback inbox poisoned");
        match inbox.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed(self.rank)),
        }
    }

    fn recv(&self) -> Result<Envelope, TransportError> {
        let inbox = self.inbox.lock().expect("loopback inbox poisoned");
        inbox.recv().map_err(|_| TransportError::Closed(self.rank))
    }
}
