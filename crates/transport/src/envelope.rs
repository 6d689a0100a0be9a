use serde::{Deserialize, Serialize};

/// Identifier of one process in the cluster.
///
/// Ranks are dense: a cluster of size `n` uses ranks `0..n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rank(pub u32);

impl Rank {
    /// Rank as a plain index, for addressing per-rank tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire-format envelope for rank-to-rank communication.
///
/// Envelopes are serialized with MessagePack for compact, fast transport.
/// The `tag` field is the sole demultiplexing key on the receive side: each
/// receiving activity is bound to exactly one tag. The payload is opaque to
/// the transport — its structure is the concern of whichever role owns the
/// tag (or of the problem-specific codec, for subproblem transfers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing tag. Tag 0 is reserved and never matched by any receiver.
    pub tag: u32,

    /// Rank that sent this envelope, stamped by the sender.
    pub sender: Rank,

    /// Per-sender message serial, for diagnostics and tracing. Ordering
    /// guarantees across tags must be encoded inside payloads, not here.
    pub seq: u64,

    /// Opaque payload bytes.
    #[serde(with = "raw_bytes")]
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create an envelope with serial 0.
    pub fn new(tag: u32, sender: Rank, payload: Vec<u8>) -> Self {
        Self {
            tag,
            sender,
            seq: 0,
            payload,
        }
    }

    /// Create an envelope with an explicit per-sender serial.
    pub fn with_seq(tag: u32, sender: Rank, seq: u64, payload: Vec<u8>) -> Self {
        Self {
            tag,
            sender,
            seq,
            payload,
        }
    }

    /// Serialize the envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Helper module for serde to handle `Vec<u8>` as raw bytes in MessagePack.
mod raw_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_envelope_bytes() {
        let env = Envelope::with_seq(7, Rank(3), 42, b"payload".to_vec());
        let bytes = env.to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.tag, 7);
        assert_eq!(decoded.sender, Rank(3));
        assert_eq!(decoded.seq, 42);
        assert_eq!(decoded.payload, b"payload");
    }

    #[test]
    fn new_starts_at_seq_zero() {
        let env = Envelope::new(2, Rank(0), Vec::new());
        assert_eq!(env.seq, 0);
        assert!(env.payload.is_empty());
    }

    #[test]
    fn rank_display_and_index() {
        assert_eq!(Rank(5).to_string(), "5");
        assert_eq!(Rank(5).index(), 5);
    }
}
