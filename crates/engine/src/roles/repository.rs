//! Solution repository exchange for enumeration-mode searches.
//!
//! When the search collects every acceptable solution instead of a single
//! incumbent, ranks ship repository fragments to each other: the receiver
//! accepts ad-hoc fragments from any rank, while the merger folds fragments
//! flowing up the follower tree toward the hub, deduplicating by solution
//! identity at every hop.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::buffer::RecvBuffer;
use crate::error::EngineError;
use crate::roles::StepCtx;
use crate::thread::RunStatus;
use crate::topology;
use crate::wire::{self, RepoFragment, SolutionRecord};

// ── Repository ───────────────────────────────────────────────────────

/// The local set of collected solutions, keyed by identity.
#[derive(Debug, Default)]
pub struct Repository {
    solutions: BTreeMap<u64, SolutionRecord>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one solution; duplicates by identity are dropped.
    /// Returns whether the solution was new.
    pub fn insert(&mut self, record: SolutionRecord) -> bool {
        match self.solutions.entry(record.id) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Fold a fragment in; returns how many solutions were new.
    pub fn merge(&mut self, fragment: RepoFragment) -> usize {
        fragment
            .solutions
            .into_iter()
            .filter(|record| self.insert(record.clone()))
            .count()
    }

    /// Snapshot the whole repository as outgoing fragments of at most
    /// `batch` solutions each; the final fragment carries the `last` mark.
    ///
    /// An empty repository still yields one empty final fragment, so a
    /// parent counting reporting children sees every child exactly once.
    pub fn to_fragments(&self, batch: usize) -> Vec<RepoFragment> {
        let records: Vec<SolutionRecord> = self.solutions.values().cloned().collect();
        if records.is_empty() {
            return vec![RepoFragment {
                solutions: Vec::new(),
                last: true,
            }];
        }
        let chunks = records.len().div_ceil(batch);
        records
            .chunks(batch)
            .enumerate()
            .map(|(i, chunk)| RepoFragment {
                solutions: chunk.to_vec(),
                last: i + 1 == chunks,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.solutions.contains_key(&id)
    }
}

// ── Roles ────────────────────────────────────────────────────────────

/// Accepts repository fragments sent directly by other ranks.
#[derive(Debug, Default)]
pub struct RepoReceiverRole {
    fragments: u64,
}

impl RepoReceiverRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        let (payload, sender) = buf.take();
        let fragment: RepoFragment = wire::decode(&payload)?;

        self.fragments += 1;
        let added = ctx.shared.repository.merge(fragment);
        debug!(
            rank = %ctx.rank,
            from = %sender,
            added,
            total = ctx.shared.repository.len(),
            "repository fragment received"
        );
        Ok(RunStatus::RunOk)
    }
}

/// Folds fragments climbing the follower tree rooted at the hub; once every
/// child subtree has sent its final fragment, forwards the merged
/// repository upward and retires.
#[derive(Debug, Default)]
pub struct RepoMergeRole {
    children_reported: usize,
}

impl RepoMergeRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        let (payload, sender) = buf.take();
        let fragment: RepoFragment = wire::decode(&payload)?;

        // A child counts as reported only on its final fragment.
        let finished = fragment.last;
        let added = ctx.shared.repository.merge(fragment);
        if finished {
            self.children_reported += 1;
        }
        debug!(
            rank = %ctx.rank,
            from = %sender,
            added,
            finished,
            reported = self.children_reported,
            "repository merge step"
        );

        let radix = ctx.config.cluster.tree_radix;
        let expected =
            topology::tree_children(ctx.rank, ctx.hub_rank(), ctx.size, radix).len();
        if self.children_reported < expected {
            return Ok(RunStatus::RunOk);
        }

        match topology::tree_parent(ctx.rank, ctx.hub_rank(), ctx.size, radix) {
            Some(parent) => {
                let batch = ctx.config.buffers.repository_batch;
                debug!(
                    rank = %ctx.rank,
                    %parent,
                    solutions = ctx.shared.repository.len(),
                    "forwarding merged repository upward"
                );
                for fragment in ctx.shared.repository.to_fragments(batch) {
                    ctx.send_to(parent, ctx.tags.repo_merge, wire::encode(&fragment)?)?;
                }
            }
            None => {
                info!(
                    rank = %ctx.rank,
                    solutions = ctx.shared.repository.len(),
                    "repository merge complete at tree root"
                );
            }
        }
        Ok(RunStatus::RunExit)
    }
}
