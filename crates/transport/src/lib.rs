pub mod envelope;
pub mod error;
pub mod loopback;
pub mod traits;

pub use envelope::{Envelope, Rank};
pub use error::TransportError;
pub use loopback::{LoopbackCluster, LoopbackEndpoint};
pub use traits::Transport;
