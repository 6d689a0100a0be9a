//! Control-message payloads exchanged between the engine's roles.
//!
//! These cover only the scheduling and load-distribution protocol. The
//! subproblem and solution bytes inside them stay opaque — their structure
//! belongs to the problem-specific codec, which packs and unpacks them at
//! the collaborator boundary.
//!
//! Transport delivery order is only per-sender FIFO, so anything that must
//! be ordered across tags carries its own sequence number here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use rangier_transport::Rank;

use crate::error::EngineError;

/// Encode a control payload to MessagePack bytes.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, EngineError> {
    Ok(rmp_serde::to_vec(msg)?)
}

/// Decode a control payload from MessagePack bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EngineError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

// ── Hub channel ──────────────────────────────────────────────────────

/// Everything the hub can receive on its tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HubMsg {
    /// Aggregated status/token report from a worker.
    Report(WorkerReport),
    /// Cooperative retirement of the hub thread.
    Shutdown,
}

/// A worker's periodic status report to its hub.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Current search-tree load (e.g. open subproblem count or weight).
    pub load: f64,
    /// Best bound currently held by this worker.
    pub bound: f64,
    /// Work tokens the worker is asking for.
    pub tokens_wanted: u32,
    /// Acknowledgments for previously granted tokens.
    pub acks: u32,
    /// Willing to give away work this epoch.
    pub donor: bool,
    /// Wants to receive work this epoch.
    pub receiver: bool,
}

/// Control signals relayed between a worker and a remote hub.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum WorkerControl {
    /// Hub probes whether the worker still holds work.
    TerminationCheck { round: u64 },
    /// Hub tells the worker to keep searching.
    Resume,
    /// Hub tells the worker's auxiliary thread to retire.
    Quit,
}

// ── Subproblem channel ───────────────────────────────────────────────

/// Tokenized request for one unit of subproblem work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubproblemRequest {
    pub token: u64,
    /// Rank whose receiver should get the packed subproblem.
    pub deliver_to: Rank,
}

/// A subproblem changing ownership, packed by the collaborator codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubproblemTransfer {
    pub token: u64,
    pub packed: Vec<u8>,
}

// ── Incumbent channel ────────────────────────────────────────────────

/// An improved incumbent objective value relayed along the follower tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IncumbentUpdate {
    pub value: f64,
    /// Origin-local improvement counter; ordering between ranks is by
    /// `value` alone.
    pub seq: u64,
    /// Rank that found the improvement; the relay tree is rooted here.
    pub origin: Rank,
}

// ── Load-log ring ────────────────────────────────────────────────────

/// The single token circulating the ring to serialize load-log appends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadLogToken {
    /// Completed circuits; incremented each time the token passes rank 0.
    pub round: u64,
}

// ── Repository channel (enumeration mode) ────────────────────────────

/// One solution held in the repository, identified for deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionRecord {
    /// Solution identity assigned by the collaborator codec.
    pub id: u64,
    pub value: f64,
    pub packed: Vec<u8>,
}

/// A batch of repository solutions in flight between ranks.
///
/// A repository snapshot travels as one or more fragments of at most
/// `repository_batch` solutions each, so every fragment fits the receive
/// buffer both sides sized from the same configuration. `last` marks the
/// final fragment of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoFragment {
    pub solutions: Vec<SolutionRecord>,
    pub last: bool,
}

// ── Early-output handshake ───────────────────────────────────────────

/// Three-phase handshake for emitting a confirmed-global incumbent.
///
/// A worker requests, the coordinator delivers back if the value has not
/// been superseded by a better global incumbent, and the worker confirms
/// after writing output. `seq` is a correlation id echoed through all three
/// phases. Confirm before deliver is unreachable under correct roles and is
/// treated as an assertion failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum EarlyOutputMsg {
    Request { value: f64, seq: u64 },
    Deliver { value: f64, seq: u64 },
    Confirm { seq: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_report_roundtrips() {
        let msg = HubMsg::Report(WorkerReport {
            load: 12.5,
            bound: -3.0,
            tokens_wanted: 2,
            acks: 1,
            donor: true,
            receiver: false,
        });
        let bytes = encode(&msg).unwrap();
        match decode::<HubMsg>(&bytes).unwrap() {
            HubMsg::Report(r) => {
                assert_eq!(r.load, 12.5);
                assert_eq!(r.bound, -3.0);
                assert!(r.donor);
                assert!(!r.receiver);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn subproblem_transfer_keeps_opaque_bytes() {
        let msg = SubproblemTransfer {
            token: 9,
            packed: vec![0, 159, 146, 150],
        };
        let bytes = encode(&msg).unwrap();
        let decoded: SubproblemTransfer = decode(&bytes).unwrap();
        assert_eq!(decoded.token, 9);
        assert_eq!(decoded.packed, vec![0, 159, 146, 150]);
    }

    #[test]
    fn decode_garbage_is_an_error() {
        assert!(decode::<IncumbentUpdate>(&[0xFF, 0x00]).is_err());
    }
}
