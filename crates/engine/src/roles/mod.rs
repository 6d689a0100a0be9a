//! The closed set of message-triggered thread roles.
//!
//! Each role binds exactly one tag and one fixed-capacity receive buffer at
//! construction; the binding is never renegotiated. Dispatch is an explicit
//! match over the [`Role`] enum rather than virtual calls, so the full role
//! set is auditable in one place.

pub mod early_output;
pub mod hub;
pub mod incumbent;
pub mod load_log;
pub mod repository;
pub mod subproblem;
pub mod worker_aux;

pub use early_output::EarlyOutputRole;
pub use hub::HubRole;
pub use incumbent::IncumbentCastRole;
pub use load_log::{LoadLogChainRole, LoadLogEntry};
pub use repository::{RepoMergeRole, RepoReceiverRole, Repository};
pub use subproblem::{SpReceiverRole, SpServerRole};
pub use worker_aux::WorkerAuxRole;

use rangier_transport::{Envelope, Rank, Transport};

use crate::buffer::RecvBuffer;
use crate::config::SearchConfig;
use crate::error::EngineError;
use crate::runtime::{SearchCallbacks, SharedState};
use crate::tag::{MessageTag, TagAllocator};
use crate::thread::{DiagColor, RunStatus};

/// Fixed overhead budgeted per control message for envelope framing and
/// MessagePack structure around the variable-size parts.
const FRAME_OVERHEAD: usize = 64;

// ── Role kinds ───────────────────────────────────────────────────────

/// Identity of each concrete role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Hub,
    WorkerAux,
    SpServer,
    SpReceiver,
    IncumbentCast,
    LoadLogChain,
    RepoReceiver,
    RepoMerge,
    EarlyOutput,
}

impl RoleKind {
    pub fn name(self) -> &'static str {
        match self {
            RoleKind::Hub => "hub",
            RoleKind::WorkerAux => "worker-aux",
            RoleKind::SpServer => "sp-server",
            RoleKind::SpReceiver => "sp-receiver",
            RoleKind::IncumbentCast => "incumbent-cast",
            RoleKind::LoadLogChain => "load-log-chain",
            RoleKind::RepoReceiver => "repo-receiver",
            RoleKind::RepoMerge => "repo-merge",
            RoleKind::EarlyOutput => "early-output",
        }
    }

    pub fn color(self) -> DiagColor {
        match self {
            RoleKind::Hub => DiagColor::Red,
            RoleKind::WorkerAux => DiagColor::Green,
            RoleKind::SpServer => DiagColor::Yellow,
            RoleKind::SpReceiver => DiagColor::Blue,
            RoleKind::IncumbentCast => DiagColor::Magenta,
            RoleKind::LoadLogChain => DiagColor::Cyan,
            RoleKind::RepoReceiver => DiagColor::Blue,
            RoleKind::RepoMerge => DiagColor::Yellow,
            RoleKind::EarlyOutput => DiagColor::Plain,
        }
    }

    /// Static scheduling priority under the weighted disciplines.
    pub fn priority(self) -> f64 {
        match self {
            RoleKind::Hub => 1.0,
            RoleKind::IncumbentCast => 0.9,
            RoleKind::SpServer | RoleKind::SpReceiver => 0.8,
            RoleKind::EarlyOutput => 0.6,
            RoleKind::WorkerAux => 0.5,
            RoleKind::RepoReceiver | RoleKind::RepoMerge => 0.4,
            RoleKind::LoadLogChain => 0.2,
        }
    }

    /// Receive-buffer capacity: worst-case payload for this role's tag
    /// under `config`, plus framing overhead.
    pub fn buffer_capacity(self, config: &SearchConfig) -> usize {
        let b = &config.buffers;
        match self {
            // Token and ack counts dominate the hub report.
            RoleKind::Hub => {
                FRAME_OVERHEAD + 8 * (b.max_tokens as usize + b.max_acks as usize)
            }
            RoleKind::SpReceiver => FRAME_OVERHEAD + b.max_subproblem_bytes,
            RoleKind::RepoReceiver | RoleKind::RepoMerge => {
                FRAME_OVERHEAD + b.repository_batch * (b.max_solution_bytes + 24)
            }
            // Fixed-size control payloads.
            RoleKind::WorkerAux
            | RoleKind::SpServer
            | RoleKind::IncumbentCast
            | RoleKind::LoadLogChain
            | RoleKind::EarlyOutput => FRAME_OVERHEAD,
        }
    }
}

// ── Tag table ────────────────────────────────────────────────────────

/// Reserved tag for every role kind, allocated in one fixed order.
///
/// Every rank allocates the full table — including tags for roles it does
/// not instantiate — so tag values agree across the cluster without any
/// negotiation.
#[derive(Debug, Clone, Copy)]
pub struct TagTable {
    pub hub: MessageTag,
    pub worker_aux: MessageTag,
    pub sp_server: MessageTag,
    pub sp_receiver: MessageTag,
    pub incumbent: MessageTag,
    pub load_log: MessageTag,
    pub repo_receiver: MessageTag,
    pub repo_merge: MessageTag,
    pub early_output: MessageTag,
}

impl TagTable {
    pub fn allocate(allocator: &mut TagAllocator) -> Self {
        Self {
            hub: allocator.issue(),
            worker_aux: allocator.issue(),
            sp_server: allocator.issue(),
            sp_receiver: allocator.issue(),
            incumbent: allocator.issue(),
            load_log: allocator.issue(),
            repo_receiver: allocator.issue(),
            repo_merge: allocator.issue(),
            early_output: allocator.issue(),
        }
    }

    pub fn for_kind(&self, kind: RoleKind) -> MessageTag {
        match kind {
            RoleKind::Hub => self.hub,
            RoleKind::WorkerAux => self.worker_aux,
            RoleKind::SpServer => self.sp_server,
            RoleKind::SpReceiver => self.sp_receiver,
            RoleKind::IncumbentCast => self.incumbent,
            RoleKind::LoadLogChain => self.load_log,
            RoleKind::RepoReceiver => self.repo_receiver,
            RoleKind::RepoMerge => self.repo_merge,
            RoleKind::EarlyOutput => self.early_output,
        }
    }
}

// ── Step context ─────────────────────────────────────────────────────

/// Everything a role's run step may touch, borrowed from the runtime for
/// the duration of the step.
pub struct StepCtx<'a> {
    pub rank: Rank,
    pub size: u32,
    pub config: &'a SearchConfig,
    pub tags: &'a TagTable,
    pub transport: &'a dyn Transport,
    pub shared: &'a mut SharedState,
    pub callbacks: &'a mut SearchCallbacks,
}

impl StepCtx<'_> {
    /// Send a control payload to another rank's role.
    pub fn send_to(&self, to: Rank, tag: MessageTag, payload: Vec<u8>) -> Result<(), EngineError> {
        self.transport
            .send(to, Envelope::new(tag.0, self.rank, payload))?;
        Ok(())
    }

    /// Whether this rank hosts the hub.
    pub fn is_hub(&self) -> bool {
        self.rank.0 == self.config.cluster.hub_rank
    }

    pub fn hub_rank(&self) -> Rank {
        Rank(self.config.cluster.hub_rank)
    }
}

// ── Role dispatch ────────────────────────────────────────────────────

/// The closed set of schedulable roles.
#[derive(Debug)]
pub enum Role {
    Hub(HubRole),
    WorkerAux(WorkerAuxRole),
    SpServer(SpServerRole),
    SpReceiver(SpReceiverRole),
    IncumbentCast(IncumbentCastRole),
    LoadLogChain(LoadLogChainRole),
    RepoReceiver(RepoReceiverRole),
    RepoMerge(RepoMergeRole),
    EarlyOutput(EarlyOutputRole),
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Hub(_) => RoleKind::Hub,
            Role::WorkerAux(_) => RoleKind::WorkerAux,
            Role::SpServer(_) => RoleKind::SpServer,
            Role::SpReceiver(_) => RoleKind::SpReceiver,
            Role::IncumbentCast(_) => RoleKind::IncumbentCast,
            Role::LoadLogChain(_) => RoleKind::LoadLogChain,
            Role::RepoReceiver(_) => RoleKind::RepoReceiver,
            Role::RepoMerge(_) => RoleKind::RepoMerge,
            Role::EarlyOutput(_) => RoleKind::EarlyOutput,
        }
    }

    /// Run one step: consume the message in `buf` and act on it.
    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        match self {
            Role::Hub(role) => role.step(buf, ctx),
            Role::WorkerAux(role) => role.step(buf, ctx),
            Role::SpServer(role) => role.step(buf, ctx),
            Role::SpReceiver(role) => role.step(buf, ctx),
            Role::IncumbentCast(role) => role.step(buf, ctx),
            Role::LoadLogChain(role) => role.step(buf, ctx),
            Role::RepoReceiver(role) => role.step(buf, ctx),
            Role::RepoMerge(role) => role.step(buf, ctx),
            Role::EarlyOutput(role) => role.step(buf, ctx),
        }
    }

    /// Designated pre-exit action, run once before the queue discards the
    /// thread. Incumbent broadcast and early output reactivate the hub; the
    /// hub's own retirement also fires the reactivation hook so the search
    /// layer can decide whether to bring it back.
    pub fn pre_exit(&mut self, shared: &mut SharedState) {
        match self {
            Role::Hub(_) | Role::IncumbentCast(_) | Role::EarlyOutput(_) => {
                shared.hub_reactivate = true;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_table_is_deterministic_across_ranks() {
        let mut a = TagAllocator::new(1000);
        let mut b = TagAllocator::new(1000);
        let ta = TagTable::allocate(&mut a);
        let tb = TagTable::allocate(&mut b);
        assert_eq!(ta.hub, tb.hub);
        assert_eq!(ta.early_output, tb.early_output);
        assert_eq!(ta.hub, MessageTag(MessageTag::FIRST_FREE));
    }

    #[test]
    fn all_role_tags_are_distinct() {
        let mut alloc = TagAllocator::new(1000);
        let t = TagTable::allocate(&mut alloc);
        let tags = [
            t.hub,
            t.worker_aux,
            t.sp_server,
            t.sp_receiver,
            t.incumbent,
            t.load_log,
            t.repo_receiver,
            t.repo_merge,
            t.early_output,
        ];
        for (i, a) in tags.iter().enumerate() {
            for b in &tags[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn buffer_capacities_scale_with_config() {
        let mut config = SearchConfig::default();
        let small = RoleKind::SpReceiver.buffer_capacity(&config);
        config.buffers.max_subproblem_bytes *= 2;
        let large = RoleKind::SpReceiver.buffer_capacity(&config);
        assert!(large > small);

        // Control-only roles are unaffected by payload sizing.
        assert_eq!(
            RoleKind::SpServer.buffer_capacity(&config),
            FRAME_OVERHEAD
        );
    }
}
