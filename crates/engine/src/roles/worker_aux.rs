//! Worker auxiliary: control relay between a worker and a remote hub.
//!
//! Present only on worker ranks with no co-located hub. Termination checks
//! and resume signals land here so the worker's search loop never has to
//! poll the hub channel itself.

use tracing::{debug, info};

use crate::buffer::RecvBuffer;
use crate::error::EngineError;
use crate::roles::StepCtx;
use crate::thread::RunStatus;
use crate::wire::{self, HubMsg, WorkerControl, WorkerReport};

#[derive(Debug, Default)]
pub struct WorkerAuxRole {
    checks_answered: u64,
}

impl WorkerAuxRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        let (payload, sender) = buf.take();
        match wire::decode::<WorkerControl>(&payload)? {
            WorkerControl::TerminationCheck { round } => {
                self.checks_answered += 1;
                let load = ctx.shared.local_load;
                debug!(rank = %ctx.rank, round, load, "answering termination check");

                // Answer with the worker's current standing so the hub can
                // fold it like any other status report.
                let report = HubMsg::Report(WorkerReport {
                    load,
                    bound: ctx.shared.incumbent.value,
                    tokens_wanted: 0,
                    acks: 1,
                    donor: load > 0.0,
                    receiver: load == 0.0,
                });
                ctx.send_to(sender, ctx.tags.hub, wire::encode(&report)?)?;
                Ok(RunStatus::RunOk)
            }
            WorkerControl::Resume => {
                debug!(rank = %ctx.rank, "resume signal relayed");
                Ok(RunStatus::RunOk)
            }
            WorkerControl::Quit => {
                info!(rank = %ctx.rank, checks = self.checks_answered, "worker auxiliary retiring");
                Ok(RunStatus::RunExit)
            }
        }
    }
}
