//! Incumbent broadcast along a radix-bounded follower tree.
//!
//! A flat broadcast from the improving rank would put O(cluster) sends on
//! one rank; relaying through the tree rooted at the originator bounds each
//! rank's fan-out to the configured radix. Updates are ordered by objective
//! value alone: sequence counters are per-origin, so two concurrent
//! improvements can carry the same sequence number, and the strictly better
//! value must win at every rank regardless of arrival order. The sequence
//! and origin ride along for diagnostics and handshake correlation.

use tracing::{debug, trace};

use crate::buffer::RecvBuffer;
use crate::error::EngineError;
use crate::roles::StepCtx;
use crate::thread::RunStatus;
use crate::topology;
use crate::wire::{self, IncumbentUpdate};

#[derive(Debug, Default)]
pub struct IncumbentCastRole {
    relayed: u64,
}

impl IncumbentCastRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        let (payload, sender) = buf.take();
        let update: IncumbentUpdate = wire::decode(&payload)?;

        let incumbent = &mut ctx.shared.incumbent;
        // Equal values are duplicates of a broadcast already relayed.
        if update.value >= incumbent.value {
            trace!(
                rank = %ctx.rank,
                from = %sender,
                value = update.value,
                have = incumbent.value,
                "non-improving incumbent relay dropped"
            );
            return Ok(RunStatus::RunOk);
        }

        incumbent.value = update.value;
        incumbent.seq = update.seq;
        incumbent.origin = update.origin;
        (ctx.callbacks.on_incumbent_improved)(update.value);

        // Relay to this rank's children in the tree rooted at the origin,
        // re-loading the send payload for each next hop.
        let children =
            topology::tree_children(ctx.rank, update.origin, ctx.size, ctx.config.cluster.tree_radix);
        for child in children {
            self.relayed += 1;
            debug!(
                rank = %ctx.rank,
                child = %child,
                value = update.value,
                seq = update.seq,
                "relaying incumbent"
            );
            ctx.send_to(child, ctx.tags.incumbent, wire::encode(&update)?)?;
        }
        Ok(RunStatus::RunOk)
    }
}
