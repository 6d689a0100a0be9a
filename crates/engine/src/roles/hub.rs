//! The hub: aggregates worker status and arbitrates load transfers.

use tracing::{debug, info, trace};

use rangier_transport::Rank;

use crate::buffer::RecvBuffer;
use crate::error::EngineError;
use crate::loadbal::{LoadBalPair, LoadKey, QualityKey};
use crate::roles::StepCtx;
use crate::runtime::SharedState;
use crate::thread::RunStatus;
use crate::wire::{self, HubMsg, SubproblemRequest, WorkerReport};

/// Aggregates worker reports into cluster-wide load/incumbent state and
/// issues donation directives when the scatter model fires.
#[derive(Debug, Default)]
pub struct HubRole {
    next_token: u64,
    reports_handled: u64,
}

impl HubRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        buf: &mut RecvBuffer,
        ctx: &mut StepCtx<'_>,
    ) -> Result<RunStatus, EngineError> {
        let (payload, sender) = buf.take();
        match wire::decode::<HubMsg>(&payload)? {
            HubMsg::Shutdown => {
                info!(rank = %ctx.rank, reports = self.reports_handled, "hub retiring");
                Ok(RunStatus::RunExit)
            }
            HubMsg::Report(report) => {
                self.reports_handled += 1;
                (ctx.callbacks.on_hub_message)(&payload, sender);
                self.fold_report(&report, sender, ctx);

                if report.receiver {
                    self.maybe_donate(&report, sender, ctx)?;
                }
                Ok(RunStatus::RunOk)
            }
        }
    }

    fn fold_report(&self, report: &WorkerReport, sender: Rank, ctx: &mut StepCtx<'_>) {
        let shared = &mut *ctx.shared;
        shared.total_load += report.load;
        shared.reports_seen += 1;
        shared.cluster_load += LoadBalPair::of_rank(report.donor, report.receiver);
        if report.donor {
            shared.worker_loads.push(LoadKey(report.load), sender);
        }
        shared.worker_quality.push(QualityKey(report.bound), sender);

        trace!(
            rank = %ctx.rank,
            worker = %sender,
            load = report.load,
            bound = report.bound,
            donors = shared.cluster_load.donors,
            receivers = shared.cluster_load.receivers,
            "hub folded worker report"
        );
    }

    /// Probabilistic donation decision for a worker that wants more work:
    /// one Bernoulli trial against the scatter curve, then a donor is asked
    /// to stream a subproblem to the requester. Each decision consumes the
    /// heaps built from the reports of this epoch; later reports start
    /// fresh, so neither heap accumulates stale entries across epochs.
    fn maybe_donate(
        &mut self,
        report: &WorkerReport,
        receiver: Rank,
        ctx: &mut StepCtx<'_>,
    ) -> Result<(), EngineError> {
        let shared = &mut *ctx.shared;
        let target = if shared.reports_seen > 0 {
            shared.total_load / shared.reports_seen as f64
        } else {
            0.0
        };
        let transfer = shared
            .scatter
            .should_transfer(report.load, target, shared.draw.as_mut());

        let donor = if transfer {
            Self::pick_donor(shared, receiver)
        } else {
            trace!(rank = %ctx.rank, worker = %receiver, "scatter trial declined transfer");
            None
        };
        shared.worker_loads.clear();
        shared.worker_quality.clear();

        let Some(donor) = donor else {
            if transfer {
                trace!(rank = %ctx.rank, "no donor available");
            }
            return Ok(());
        };

        let token = self.next_token;
        self.next_token += 1;

        debug!(
            rank = %ctx.rank,
            donor = %donor,
            receiver = %receiver,
            token,
            "hub directing subproblem donation"
        );
        let request = SubproblemRequest {
            token,
            deliver_to: receiver,
        };
        ctx.send_to(donor, ctx.tags.sp_server, wire::encode(&request)?)
    }

    /// Most-loaded registered donor; when no report flagged itself a donor,
    /// fall back to the quality leader, whose subtree around the best
    /// incumbent is the most promising work to replicate. Never the
    /// requester itself.
    fn pick_donor(shared: &mut SharedState, receiver: Rank) -> Option<Rank> {
        loop {
            match shared.worker_loads.pop() {
                Some(entry) if entry.rank == receiver => continue,
                Some(entry) => return Some(entry.rank),
                None => break,
            }
        }
        loop {
            match shared.worker_quality.pop() {
                Some(entry) if entry.rank == receiver => continue,
                Some(entry) => return Some(entry.rank),
                None => return None,
            }
        }
    }
}
