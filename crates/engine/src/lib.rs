//! Cooperative scheduling and message-routing core for a distributed
//! branch-and-bound search.
//!
//! Each process rank runs a [`runtime::RankRuntime`]: a single-threaded
//! cooperative scheduler whose thread objects are message-triggered roles —
//! hub, worker auxiliary, subproblem server/receiver, incumbent broadcaster,
//! load-log chainer, repository receiver/merger, early-output coordinator.
//! Envelopes are demultiplexed by tag alone; tags come from a monotonic
//! per-rank allocator that every rank replays identically, so the binding
//! agrees across the cluster without negotiation.
//!
//! The transport is pluggable through [`rangier_transport::Transport`]; the
//! in-process loopback cluster backs the integration tests.

pub mod buffer;
pub mod config;
pub mod error;
pub mod loadbal;
pub mod queue;
pub mod random;
pub mod roles;
pub mod runtime;
pub mod scatter;
pub mod tag;
pub mod thread;
pub mod topology;
pub mod wire;

pub use config::SearchConfig;
pub use error::EngineError;
pub use queue::{Discipline, ThreadQueue};
pub use roles::{Role, RoleKind, TagTable};
pub use runtime::{Incumbent, RankRuntime, SearchCallbacks, SharedState, Tick};
pub use scatter::ScatterModel;
pub use tag::{MessageTag, TagAllocator};
pub use thread::{RunStatus, ThreadId, ThreadState};
