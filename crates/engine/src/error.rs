use thiserror::Error;

use rangier_transport::TransportError;

/// Errors that can occur in the scheduling and load-distribution engine.
///
/// Only configuration and transport problems surface as errors. The
/// internal-consistency failures (tag exhaustion, receive-buffer overflow,
/// handshake ordering violations) abort the rank via assertion instead —
/// they indicate bugs or sender/receiver configuration mismatches, never
/// transient conditions.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("control message encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("control message decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}
