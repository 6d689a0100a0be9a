use thiserror::Error;

use crate::envelope::Rank;

/// Errors that can occur in the rank-to-rank transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("rank {0} out of range for cluster of size {1}")]
    RankOutOfRange(Rank, u32),

    #[error("channel to rank {0} is closed")]
    Closed(Rank),

    #[error("transport error: {0}")]
    Other(String),
}
