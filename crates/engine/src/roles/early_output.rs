//! Early output: emit an improved incumbent as soon as it is confirmed
//! globally best-so-far.
//!
//! Three-phase handshake. A worker that wants to emit sends Request to the
//! coordinator (the hub rank); the coordinator answers Deliver only if the
//! requested value has not been superseded by a better global incumbent;
//! the worker writes output and returns Confirm. The sequence number is a
//! correlation id echoed through all three phases. Several workers may
//! honestly request the same confirmed incumbent at once, so the
//! coordinator tracks one outstanding deliver per requesting rank. A
//! Confirm from a rank with no outstanding deliver is unreachable under
//! correct roles, so that ordering violation is an assertion failure.

use std::collections::BTreeMap;

use tracing::{debug, info, trace};

use rangier_transport::Rank;

use crate::buffer::RecvBuffer;
use crate::error::EngineError;
use crate::roles::StepCtx;
use crate::thread::RunStatus;
use crate::wire::{self, EarlyOutputMsg};

#[derive(Debug, Default)]
pub struct EarlyOutputRole {
    /// Coordinator side: correlation id of the deliver awaiting each
    /// requester's confirm.
    outstanding: BTreeMap<Rank, u64>,
    emitted: u64,
}

impl EarlyOutputRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        let (payload, sender) = buf.take();
        match wire::decode::<EarlyOutputMsg>(&payload)? {
            EarlyOutputMsg::Request { value, seq } => {
                // Coordinator side: deliver only while the requested value
                // is still the global best-so-far.
                if value > ctx.shared.incumbent.value {
                    trace!(
                        rank = %ctx.rank,
                        from = %sender,
                        value,
                        have = ctx.shared.incumbent.value,
                        "early-output request superseded; dropped"
                    );
                    return Ok(RunStatus::RunOk);
                }
                debug!(rank = %ctx.rank, to = %sender, value, seq, "early-output deliver");
                self.outstanding.insert(sender, seq);
                let deliver = EarlyOutputMsg::Deliver { value, seq };
                ctx.send_to(sender, ctx.tags.early_output, wire::encode(&deliver)?)?;
                Ok(RunStatus::RunOk)
            }
            EarlyOutputMsg::Deliver { value, seq } => {
                // Worker side: write the confirmed value, then confirm.
                self.emitted += 1;
                debug!(rank = %ctx.rank, value, seq, "early output emitted");
                (ctx.callbacks.on_early_output)(value);
                let confirm = EarlyOutputMsg::Confirm { seq };
                ctx.send_to(sender, ctx.tags.early_output, wire::encode(&confirm)?)?;
                Ok(RunStatus::RunOk)
            }
            EarlyOutputMsg::Confirm { seq } => {
                match self.outstanding.remove(&sender) {
                    Some(expected) => {
                        assert_eq!(
                            seq, expected,
                            "early-output confirm for sequence {seq} while awaiting {expected}"
                        );
                        info!(rank = %ctx.rank, from = %sender, seq, "early output confirmed");
                    }
                    None => {
                        panic!("early-output confirm received before deliver (seq {seq})");
                    }
                }
                Ok(RunStatus::RunOk)
            }
        }
    }
}
