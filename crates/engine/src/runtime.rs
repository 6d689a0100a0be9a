//! Per-rank runtime context: the cooperative main loop.
//!
//! One `RankRuntime` owns everything a rank needs — tag allocator, thread
//! queue, role table, scatter model, random source, callbacks — as explicit
//! state with no process globals, so tests can drive several runtimes in a
//! single process. Exactly one thread object runs at a time; cross-rank
//! parallelism happens only through the transport.

use std::time::Instant;

use tracing::{debug, info, trace, warn};

use rangier_transport::{Envelope, Rank, Transport};

use crate::config::SearchConfig;
use crate::error::EngineError;
use crate::loadbal::{LoadBalPair, WorkerInHeap, WorkerInQHeap};
use crate::queue::ThreadQueue;
use crate::random::{ProbabilityDraw, SeededDraw};
use crate::roles::{
    EarlyOutputRole, HubRole, IncumbentCastRole, LoadLogChainRole, LoadLogEntry, RepoMergeRole,
    RepoReceiverRole, Repository, Role, RoleKind, SpReceiverRole, SpServerRole, StepCtx, TagTable,
    WorkerAuxRole,
};
use crate::scatter::ScatterModel;
use crate::tag::{MessageTag, TagAllocator};
use crate::thread::{RunStatus, ThreadCore, ThreadId, ThreadState};
use crate::topology;
use crate::wire::{self, EarlyOutputMsg, HubMsg, IncumbentUpdate, LoadLogToken, SubproblemRequest, WorkerReport};

// ── Collaborator callbacks ───────────────────────────────────────────

/// The callback surface the search-control layer registers with the
/// scheduler. All default to no-ops.
pub struct SearchCallbacks {
    /// A packed subproblem arrived from another rank.
    pub on_subproblem_received: Box<dyn FnMut(&[u8], Rank) + Send>,
    /// The global incumbent improved to this objective value.
    pub on_incumbent_improved: Box<dyn FnMut(f64) + Send>,
    /// Raw hub-channel payload, for layers that track hub traffic.
    pub on_hub_message: Box<dyn FnMut(&[u8], Rank) + Send>,
    /// A confirmed-global incumbent should be written to external output.
    pub on_early_output: Box<dyn FnMut(f64) + Send>,
    /// Pop a packed subproblem from the local pool for donation.
    pub take_subproblem: Box<dyn FnMut(u64) -> Option<Vec<u8>> + Send>,
}

impl Default for SearchCallbacks {
    fn default() -> Self {
        Self {
            on_subproblem_received: Box::new(|_, _| {}),
            on_incumbent_improved: Box::new(|_| {}),
            on_hub_message: Box::new(|_, _| {}),
            on_early_output: Box::new(|_| {}),
            take_subproblem: Box::new(|_| None),
        }
    }
}

impl SearchCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_subproblem_received<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[u8], Rank) + Send + 'static,
    {
        self.on_subproblem_received = Box::new(f);
        self
    }

    pub fn on_incumbent_improved<F>(mut self, f: F) -> Self
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.on_incumbent_improved = Box::new(f);
        self
    }

    pub fn on_hub_message<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[u8], Rank) + Send + 'static,
    {
        self.on_hub_message = Box::new(f);
        self
    }

    pub fn on_early_output<F>(mut self, f: F) -> Self
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.on_early_output = Box::new(f);
        self
    }

    pub fn take_subproblem<F>(mut self, f: F) -> Self
    where
        F: FnMut(u64) -> Option<Vec<u8>> + Send + 'static,
    {
        self.take_subproblem = Box::new(f);
        self
    }
}

// ── Shared per-rank state ────────────────────────────────────────────

/// Best feasible solution known to this rank.
#[derive(Debug, Clone, Copy)]
pub struct Incumbent {
    pub value: f64,
    /// Improvement counter of the rank that found this value.
    pub seq: u64,
    pub origin: Rank,
}

/// Mutable state shared by every role on one rank. No locking: only one
/// thread object runs at a time.
pub struct SharedState {
    pub incumbent: Incumbent,
    pub cluster_load: LoadBalPair,
    pub worker_loads: WorkerInHeap,
    pub worker_quality: WorkerInQHeap,
    pub total_load: f64,
    pub reports_seen: u64,
    pub repository: Repository,
    pub load_log: Vec<LoadLogEntry>,
    pub scatter: ScatterModel,
    pub draw: Box<dyn ProbabilityDraw>,
    /// This rank's current search-tree load, set by the search layer.
    pub local_load: f64,
    /// Set by pre-exit actions that should reactivate the hub.
    pub hub_reactivate: bool,
}

impl SharedState {
    fn new(config: &SearchConfig, rank: Rank) -> Self {
        Self {
            incumbent: Incumbent {
                value: f64::INFINITY,
                seq: 0,
                origin: rank,
            },
            cluster_load: LoadBalPair::default(),
            worker_loads: WorkerInHeap::new(),
            worker_quality: WorkerInQHeap::new(),
            total_load: 0.0,
            reports_seen: 0,
            repository: Repository::new(),
            load_log: Vec::new(),
            scatter: config.scatter.model(),
            draw: Box::new(SeededDraw::new(config.scheduler.seed, rank.0)),
            local_load: 0.0,
            hub_reactivate: false,
        }
    }
}

// ── Runtime ──────────────────────────────────────────────────────────

/// What one call to `tick`/`poll` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Ran one Ready thread object.
    Ran(ThreadId),
    /// Dispatched one arrived envelope to its bound role.
    Dispatched,
    /// Nothing Ready and nothing arrived (`poll` only).
    Idle,
}

/// The per-rank cooperative runtime.
pub struct RankRuntime<T: Transport> {
    rank: Rank,
    size: u32,
    config: SearchConfig,
    transport: T,
    allocator: TagAllocator,
    tags: TagTable,
    queue: ThreadQueue,
    cores: Vec<ThreadCore>,
    roles: Vec<Role>,
    pub shared: SharedState,
    pub callbacks: SearchCallbacks,
    epoch: Instant,
}

impl<T: Transport> RankRuntime<T> {
    /// Build the rank's full role set and bind every role to its tag.
    ///
    /// Role-to-tag binding happens here, once, and is never renegotiated
    /// during a run.
    pub fn new(
        config: SearchConfig,
        transport: T,
        callbacks: SearchCallbacks,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let rank = transport.rank();
        let size = transport.size();
        if config.cluster.hub_rank >= size {
            return Err(EngineError::Config(format!(
                "hub_rank {} out of range for cluster of size {size}",
                config.cluster.hub_rank
            )));
        }

        let mut allocator = TagAllocator::new(transport.max_tag());
        let tags = TagTable::allocate(&mut allocator);
        let shared = SharedState::new(&config, rank);

        let mut runtime = Self {
            rank,
            size,
            queue: ThreadQueue::new(config.scheduler.discipline),
            config,
            transport,
            allocator,
            tags,
            cores: Vec::new(),
            roles: Vec::new(),
            shared,
            callbacks,
            epoch: Instant::now(),
        };
        runtime.build_roles();

        info!(
            rank = %runtime.rank,
            size = runtime.size,
            hub = runtime.is_hub(),
            threads = runtime.roles.len(),
            discipline = ?runtime.queue.discipline(),
            "rank runtime initialized"
        );
        Ok(runtime)
    }

    /// Instantiate the roles this rank plays. Hub ranks host the hub; all
    /// other ranks host the worker auxiliary instead.
    fn build_roles(&mut self) {
        if self.is_hub() {
            self.add_role(Role::Hub(HubRole::new()));
        } else {
            self.add_role(Role::WorkerAux(WorkerAuxRole::new()));
        }
        self.add_role(Role::SpServer(SpServerRole::new()));
        self.add_role(Role::SpReceiver(SpReceiverRole::new()));
        self.add_role(Role::IncumbentCast(IncumbentCastRole::new()));
        if self.config.features.load_log_rounds > 0 {
            self.add_role(Role::LoadLogChain(LoadLogChainRole::new()));
        }
        if self.config.features.enumeration {
            self.add_role(Role::RepoReceiver(RepoReceiverRole::new()));
            self.add_role(Role::RepoMerge(RepoMergeRole::new()));
        }
        if self.config.features.early_output {
            self.add_role(Role::EarlyOutput(EarlyOutputRole::new()));
        }
    }

    fn add_role(&mut self, role: Role) {
        let kind = role.kind();
        let id = ThreadId(self.roles.len());
        let mut core = ThreadCore::message_triggered(
            kind.name(),
            kind.color(),
            kind.priority(),
            self.tags.for_kind(kind),
            kind.buffer_capacity(&self.config),
        );
        self.queue.insert(id, &mut core);
        debug!(
            rank = %self.rank,
            thread = kind.name(),
            tag = %core.tag,
            capacity = core.buffer.capacity(),
            "role bound"
        );
        self.cores.push(core);
        self.roles.push(role);
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_hub(&self) -> bool {
        self.rank.0 == self.config.cluster.hub_rank
    }

    pub fn hub_rank(&self) -> Rank {
        Rank(self.config.cluster.hub_rank)
    }

    pub fn tags(&self) -> &TagTable {
        &self.tags
    }

    pub fn incumbent(&self) -> Incumbent {
        self.shared.incumbent
    }

    pub fn repository(&self) -> &Repository {
        &self.shared.repository
    }

    pub fn load_log(&self) -> &[LoadLogEntry] {
        &self.shared.load_log
    }

    /// Scheduling state of the first role of the given kind, if present.
    pub fn role_state(&self, kind: RoleKind) -> Option<ThreadState> {
        self.roles
            .iter()
            .position(|role| role.kind() == kind)
            .map(|i| self.cores[i].state)
    }

    /// Remaining room in the tag space, for capacity probes between runs.
    pub fn tag_capacity(&self) -> bool {
        self.allocator.check_capacity()
    }

    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    // ── Main loop ────────────────────────────────────────────────────

    /// One scheduler step: run the next Ready thread, or block on the
    /// transport until a message arrives and dispatch it.
    pub fn tick(&mut self) -> Result<Tick, EngineError> {
        let now = self.now();
        if let Some(id) = self.queue.select_next(&mut self.cores, now) {
            self.run_thread(id, now)?;
            return Ok(Tick::Ran(id));
        }
        let envelope = self.transport.recv()?;
        self.dispatch(envelope)?;
        Ok(Tick::Dispatched)
    }

    /// Like `tick`, but never blocks: returns `Tick::Idle` when there is
    /// nothing to run and nothing has arrived.
    pub fn poll(&mut self) -> Result<Tick, EngineError> {
        let now = self.now();
        if let Some(id) = self.queue.select_next(&mut self.cores, now) {
            self.run_thread(id, now)?;
            return Ok(Tick::Ran(id));
        }
        match self.transport.try_recv()? {
            Some(envelope) => {
                self.dispatch(envelope)?;
                Ok(Tick::Dispatched)
            }
            None => Ok(Tick::Idle),
        }
    }

    /// Poll until idle; returns how many steps ran.
    pub fn drain(&mut self) -> Result<usize, EngineError> {
        let mut steps = 0;
        while self.poll()? != Tick::Idle {
            steps += 1;
        }
        Ok(steps)
    }

    /// Route an arrived envelope to the role bound to its tag, loading the
    /// role's receive buffer and unblocking its thread.
    fn dispatch(&mut self, envelope: Envelope) -> Result<(), EngineError> {
        if envelope.tag == MessageTag::NULL.0 {
            debug!(rank = %self.rank, from = %envelope.sender, "null-tag envelope dropped");
            return Ok(());
        }
        let now = self.now();
        let bound = self
            .cores
            .iter()
            .position(|core| core.tag.0 == envelope.tag && core.state != ThreadState::Dormant);
        match bound {
            Some(i) => {
                trace!(
                    rank = %self.rank,
                    thread = self.cores[i].name,
                    color = self.cores[i].color.as_str(),
                    from = %envelope.sender,
                    seq = envelope.seq,
                    "dispatching"
                );
                self.cores[i].buffer.load(&envelope);
                self.queue.unblock(&mut self.cores[i], now);
            }
            None => {
                warn!(
                    rank = %self.rank,
                    tag = envelope.tag,
                    from = %envelope.sender,
                    "no live role bound to tag; envelope dropped"
                );
            }
        }
        Ok(())
    }

    fn run_thread(&mut self, id: ThreadId, started: f64) -> Result<(), EngineError> {
        let status = {
            let Self {
                rank,
                size,
                config,
                transport,
                tags,
                cores,
                roles,
                shared,
                callbacks,
                ..
            } = self;
            let core = &mut cores[id.0];
            let role = &mut roles[id.0];
            let mut ctx = StepCtx {
                rank: *rank,
                size: *size,
                config,
                tags,
                transport: &*transport,
                shared,
                callbacks,
            };
            role.step(&mut core.buffer, &mut ctx)?
        };

        let finished = self.now();
        let core = &mut self.cores[id.0];
        self.queue.update_priority(core, finished - started, finished);
        // Single-buffer-in-flight: the slot must be free before re-arm.
        core.buffer.reset();

        match status {
            RunStatus::RunOk | RunStatus::RunBlock => {
                core.state = ThreadState::Blocked;
            }
            RunStatus::RunExit => self.retire(id),
        }
        Ok(())
    }

    /// Retire a thread: pre-exit action, then Dormant until rank shutdown.
    fn retire(&mut self, id: ThreadId) {
        let kind = self.roles[id.0].kind();
        self.roles[id.0].pre_exit(&mut self.shared);
        self.cores[id.0].state = ThreadState::Dormant;
        self.queue.remove(id);
        info!(rank = %self.rank, thread = kind.name(), "thread retired");

        // A retiring broadcast/output thread reactivates a dormant hub.
        // The hub's own retirement leaves the flag for the search layer.
        if self.shared.hub_reactivate && kind != RoleKind::Hub {
            self.shared.hub_reactivate = false;
            self.rearm_hub();
        }
    }

    /// Bring a dormant hub thread back to its armed, blocked state.
    pub fn rearm_hub(&mut self) {
        if let Some(i) = self.roles.iter().position(|r| r.kind() == RoleKind::Hub) {
            if self.cores[i].state == ThreadState::Dormant {
                self.cores[i].state = ThreadState::Blocked;
                self.queue.insert(ThreadId(i), &mut self.cores[i]);
                info!(rank = %self.rank, "hub reactivated");
            }
        }
    }

    /// Consume the hub-reactivation hook flag left by a hub retirement.
    pub fn take_hub_reactivation(&mut self) -> bool {
        std::mem::take(&mut self.shared.hub_reactivate)
    }

    /// Retire the first live thread of the given kind from the search
    /// layer, running its pre-exit action. Long-lived relay threads have no
    /// protocol message telling them to stop; the search layer calls this
    /// when their phase of the run is over. Returns whether a live thread
    /// of that kind was found.
    pub fn retire_role(&mut self, kind: RoleKind) -> bool {
        let live = (0..self.roles.len())
            .find(|&i| self.roles[i].kind() == kind && self.cores[i].state != ThreadState::Dormant);
        match live {
            Some(i) => {
                self.retire(ThreadId(i));
                true
            }
            None => false,
        }
    }

    /// Retire every live thread at shutdown, running pre-exit actions.
    pub fn retire_all(&mut self) {
        for i in 0..self.roles.len() {
            if self.cores[i].state != ThreadState::Dormant {
                self.roles[i].pre_exit(&mut self.shared);
                self.cores[i].state = ThreadState::Dormant;
                self.queue.remove(ThreadId(i));
            }
        }
        self.shared.hub_reactivate = false;
        info!(rank = %self.rank, "all threads retired");
    }

    // ── Operations exposed to the search layer ───────────────────────

    fn send(&self, to: Rank, tag: MessageTag, payload: Vec<u8>) -> Result<(), EngineError> {
        self.transport
            .send(to, Envelope::new(tag.0, self.rank, payload))?;
        Ok(())
    }

    /// Report this worker's status to the hub.
    pub fn send_report(&mut self, report: WorkerReport) -> Result<(), EngineError> {
        self.shared.local_load = report.load;
        self.send(
            self.hub_rank(),
            self.tags.hub,
            wire::encode(&HubMsg::Report(report))?,
        )
    }

    /// Ask the hub thread to retire cooperatively.
    pub fn shutdown_hub(&self) -> Result<(), EngineError> {
        self.send(self.hub_rank(), self.tags.hub, wire::encode(&HubMsg::Shutdown)?)
    }

    /// Announce an improved incumbent found on this rank and start its
    /// relay down the follower tree rooted here.
    pub fn broadcast_incumbent(&mut self, value: f64) -> Result<(), EngineError> {
        let incumbent = &mut self.shared.incumbent;
        incumbent.seq += 1;
        incumbent.value = value;
        incumbent.origin = self.rank;
        let update = IncumbentUpdate {
            value,
            seq: incumbent.seq,
            origin: self.rank,
        };

        debug!(rank = %self.rank, value, seq = update.seq, "broadcasting incumbent");
        let children = topology::tree_children(
            self.rank,
            self.rank,
            self.size,
            self.config.cluster.tree_radix,
        );
        for child in children {
            self.send(child, self.tags.incumbent, wire::encode(&update)?)?;
        }
        Ok(())
    }

    /// Directly ask another rank's server for one subproblem.
    pub fn request_subproblem(&self, from: Rank, token: u64) -> Result<(), EngineError> {
        let request = SubproblemRequest {
            token,
            deliver_to: self.rank,
        };
        self.send(from, self.tags.sp_server, wire::encode(&request)?)
    }

    /// Inject the load-log ring token; call on rank 0 only, once.
    pub fn start_load_log(&self) -> Result<(), EngineError> {
        let next = topology::ring_dest(self.rank, self.size);
        self.send(next, self.tags.load_log, wire::encode(&LoadLogToken { round: 0 })?)
    }

    /// Push this rank's repository toward the hub along the follower tree.
    ///
    /// Only tree leaves initiate; interior ranks forward automatically once
    /// all of their children have reported.
    pub fn flush_repository(&self) -> Result<(), EngineError> {
        let radix = self.config.cluster.tree_radix;
        let children = topology::tree_children(self.rank, self.hub_rank(), self.size, radix);
        if !children.is_empty() {
            return Ok(());
        }
        if let Some(parent) = topology::tree_parent(self.rank, self.hub_rank(), self.size, radix) {
            let batch = self.config.buffers.repository_batch;
            for fragment in self.shared.repository.to_fragments(batch) {
                self.send(parent, self.tags.repo_merge, wire::encode(&fragment)?)?;
            }
        }
        Ok(())
    }

    /// Ask the early-output coordinator to confirm this rank's incumbent
    /// for external output.
    pub fn request_early_output(&self) -> Result<(), EngineError> {
        let request = EarlyOutputMsg::Request {
            value: self.shared.incumbent.value,
            seq: self.shared.incumbent.seq,
        };
        self.send(self.hub_rank(), self.tags.early_output, wire::encode(&request)?)
    }

    /// Update the load figure reported by this rank's auxiliary thread.
    pub fn set_local_load(&mut self, load: f64) {
        self.shared.local_load = load;
    }
}
