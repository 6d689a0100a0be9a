//! Load-log chaining: one token around the ring serializes the periodic
//! append-only load log without a central coordinator.

use serde::Serialize;
use tracing::{debug, info};

use rangier_transport::Rank;

use crate::buffer::RecvBuffer;
use crate::error::EngineError;
use crate::loadbal::LoadBalPair;
use crate::roles::StepCtx;
use crate::thread::RunStatus;
use crate::topology;
use crate::wire::{self, LoadLogToken};

/// One appended load-log record.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LoadLogEntry {
    pub round: u64,
    pub rank: Rank,
    pub load: f64,
    pub cluster: LoadBalPair,
}

/// Holds the ring token just long enough to append this rank's record,
/// then passes it on: rank i receives from rank i − 1 mod cluster size.
#[derive(Debug, Default)]
pub struct LoadLogChainRole {
    appends: u64,
}

impl LoadLogChainRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        let (payload, _sender) = buf.take();
        let token: LoadLogToken = wire::decode(&payload)?;

        self.appends += 1;
        ctx.shared.load_log.push(LoadLogEntry {
            round: token.round,
            rank: ctx.rank,
            load: ctx.shared.local_load,
            cluster: ctx.shared.cluster_load,
        });
        debug!(rank = %ctx.rank, round = token.round, "load-log record appended");

        let next = topology::ring_dest(ctx.rank, ctx.size);
        let rounds = ctx.config.features.load_log_rounds;

        if token.round >= rounds {
            // Final circuit: propagate the finish notice around the ring,
            // but stop before handing it back to the origin.
            if next != Rank(0) {
                ctx.send_to(next, ctx.tags.load_log, wire::encode(&token)?)?;
            }
            info!(rank = %ctx.rank, appends = self.appends, "load-log chain complete");
            return Ok(RunStatus::RunExit);
        }

        // The round counter ticks up each time the token passes rank 0.
        let forwarded = LoadLogToken {
            round: if next == Rank(0) {
                token.round + 1
            } else {
                token.round
            },
        };
        ctx.send_to(next, ctx.tags.load_log, wire::encode(&forwarded)?)?;
        Ok(RunStatus::RunOk)
    }
}
