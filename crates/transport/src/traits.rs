use crate::envelope::{Envelope, Rank};
use crate::error::TransportError;

/// Point-to-point message transport between the ranks of a cluster.
///
/// Implementors guarantee per-sender FIFO delivery: two envelopes sent from
/// the same rank to the same destination arrive in send order. No ordering
/// is guaranteed across senders or across tags.
///
/// Send and receive failures are not retried by callers — a broken transport
/// means the cluster communication fabric is gone, and the rank aborts.
pub trait Transport: Send {
    /// This endpoint's own rank.
    fn rank(&self) -> Rank;

    /// Number of ranks in the cluster.
    fn size(&self) -> u32;

    /// Largest routing tag this transport can carry. Tag allocation must
    /// stay below this ceiling.
    fn max_tag(&self) -> u32;

    /// Send an envelope to another rank (or to self).
    fn send(&self, to: Rank, envelope: Envelope) -> Result<(), TransportError>;

    /// Receive the next envelope if one is already available.
    fn try_recv(&self) -> Result<Option<Envelope>, TransportError>;

    /// Receive the next envelope, blocking until one arrives.
    fn recv(&self) -> Result<Envelope, TransportError>;
}
