//! The per-rank cooperative scheduler queue.
//!
//! An ordered collection of thread objects with one of three selection
//! disciplines, fixed at construction. At most one thread is Running at any
//! instant — there is no OS-level parallelism inside a rank, only cross-rank
//! parallelism through the transport.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::thread::{ThreadCore, ThreadId, ThreadState};

/// Selection discipline, chosen once per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Discipline {
    /// Visit Ready threads in insertion order; priority is ignored.
    RoundRobin,
    /// Effective priority grows with wait time, scaled by static priority.
    TimeWeightedPriority,
    /// Time-weighted, but effective priority is clipped to [0, 1].
    BiasWeightedPriority,
}

/// Display ceiling for disciplines whose scores are otherwise unbounded.
const DISPLAY_CEILING: f64 = 1.0e9;

/// Ordered container of thread objects plus the selection policy.
#[derive(Debug)]
pub struct ThreadQueue {
    discipline: Discipline,
    /// Ceiling used to normalize weighted scores (1.0 for bias-weighted).
    max_priority: f64,
    /// Insertion order; round-robin walks this directly.
    order: Vec<ThreadId>,
    rr_cursor: usize,
    next_serial: u64,
}

impl ThreadQueue {
    pub fn new(discipline: Discipline) -> Self {
        let max_priority = match discipline {
            Discipline::RoundRobin | Discipline::TimeWeightedPriority => DISPLAY_CEILING,
            Discipline::BiasWeightedPriority => 1.0,
        };
        Self {
            discipline,
            max_priority,
            order: Vec::new(),
            rr_cursor: 0,
            next_serial: 0,
        }
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub fn max_priority(&self) -> f64 {
        self.max_priority
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Add a thread to the queue. Idle threads become Ready; threads waiting
    /// on a message stay Blocked until their tag fires.
    pub fn insert(&mut self, id: ThreadId, core: &mut ThreadCore) {
        core.serial = self.next_serial;
        self.next_serial += 1;
        if core.state == ThreadState::Idle {
            core.state = ThreadState::Ready;
        }
        self.order.push(id);
    }

    /// Remove a thread from scheduling (retirement or shutdown).
    pub fn remove(&mut self, id: ThreadId) {
        if let Some(pos) = self.order.iter().position(|&t| t == id) {
            self.order.remove(pos);
            if pos < self.rr_cursor {
                self.rr_cursor -= 1;
            }
            if self.rr_cursor >= self.order.len() {
                self.rr_cursor = 0;
            }
        }
    }

    /// Make a blocked or idle thread Ready; no-op otherwise.
    pub fn unblock(&mut self, core: &mut ThreadCore, event_time: f64) {
        match core.state {
            ThreadState::Blocked | ThreadState::Idle => {
                core.state = ThreadState::Ready;
                trace!(thread = core.name, event_time, "unblocked");
            }
            _ => {}
        }
    }

    /// Charge an observed run time against a thread, resetting its aging
    /// baseline so a thread that just ran competes from zero again.
    pub fn update_priority(&self, core: &mut ThreadCore, observed: f64, current_time: f64) {
        core.total_run += observed;
        core.last_run = current_time;
    }

    /// Pick the next thread to run and mark it Running.
    ///
    /// Returns `None` when no thread is Ready, signaling the rank's main
    /// loop to block on the transport until the next message arrives.
    pub fn select_next(&mut self, cores: &mut [ThreadCore], now: f64) -> Option<ThreadId> {
        debug_assert!(
            !cores.iter().any(|c| c.state == ThreadState::Running),
            "a thread is already running on this rank",
        );

        let selected = match self.discipline {
            Discipline::RoundRobin => self.select_round_robin(cores),
            Discipline::TimeWeightedPriority | Discipline::BiasWeightedPriority => {
                self.select_weighted(cores, now)
            }
        }?;

        let core = &mut cores[selected.0];
        core.state = ThreadState::Running;
        core.last_run = now;
        trace!(thread = core.name, color = core.color.as_str(), "selected");
        Some(selected)
    }

    fn select_round_robin(&mut self, cores: &[ThreadCore]) -> Option<ThreadId> {
        let n = self.order.len();
        for offset in 0..n {
            let pos = (self.rr_cursor + offset) % n;
            let id = self.order[pos];
            if cores[id.0].is_ready() {
                self.rr_cursor = (pos + 1) % n;
                return Some(id);
            }
        }
        None
    }

    fn select_weighted(&self, cores: &[ThreadCore], now: f64) -> Option<ThreadId> {
        let mut best: Option<(f64, u64, ThreadId)> = None;
        for &id in &self.order {
            let core = &cores[id.0];
            if !core.is_ready() {
                continue;
            }
            let effective = self.effective_priority(core, now);
            let better = match best {
                None => true,
                // Ties broken by earliest insertion.
                Some((score, serial, _)) => {
                    effective > score || (effective == score && core.serial < serial)
                }
            };
            if better {
                best = Some((effective, core.serial, id));
            }
        }
        best.map(|(_, _, id)| id)
    }

    /// Wait time since the thread last ran, scaled by its static priority
    /// and clipped to the queue's ceiling.
    fn effective_priority(&self, core: &ThreadCore, now: f64) -> f64 {
        let aged = core.priority * (now - core.last_run).max(0.0);
        aged.min(self.max_priority).max(0.0)
    }
}
