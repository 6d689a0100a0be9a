//! Subproblem server and receiver: the two ends of a work transfer.
//!
//! Pure message relays — no bounding logic. The server pulls a packed
//! subproblem from the local pool through the collaborator callback and
//! streams it to the requested rank; the receiver hands arriving bytes to
//! the local pool the same way.

use tracing::{debug, trace};

use crate::buffer::RecvBuffer;
use crate::error::EngineError;
use crate::roles::StepCtx;
use crate::thread::RunStatus;
use crate::wire::{self, SubproblemRequest, SubproblemTransfer};

/// Answers tokenized requests by streaming a packed subproblem.
#[derive(Debug, Default)]
pub struct SpServerRole {
    served: u64,
}

impl SpServerRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        let (payload, sender) = buf.take();
        let request: SubproblemRequest = wire::decode(&payload)?;

        match (ctx.callbacks.take_subproblem)(request.token) {
            Some(packed) => {
                self.served += 1;
                debug!(
                    rank = %ctx.rank,
                    requester = %sender,
                    deliver_to = %request.deliver_to,
                    token = request.token,
                    bytes = packed.len(),
                    "serving subproblem"
                );
                let transfer = SubproblemTransfer {
                    token: request.token,
                    packed,
                };
                ctx.send_to(
                    request.deliver_to,
                    ctx.tags.sp_receiver,
                    wire::encode(&transfer)?,
                )?;
            }
            None => {
                trace!(rank = %ctx.rank, token = request.token, "no subproblem available to donate");
            }
        }
        Ok(RunStatus::RunOk)
    }
}

/// Accepts incoming subproblem transfers for the local search pool.
#[derive(Debug, Default)]
pub struct SpReceiverRole {
    received: u64,
}

impl SpReceiverRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        let (payload, sender) = buf.take();
        let transfer: SubproblemTransfer = wire::decode(&payload)?;

        self.received += 1;
        debug!(
            rank = %ctx.rank,
            from = %sender,
            token = transfer.token,
            bytes = transfer.packed.len(),
            "subproblem received"
        );
        (ctx.callbacks.on_subproblem_received)(&transfer.packed, sender);
        Ok(RunStatus::RunOk)
    }
}
