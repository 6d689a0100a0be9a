//! The unit of cooperative scheduling: a named, colored, priority-bearing
//! activity owned by one rank's runtime and never shared across ranks.

use crate::buffer::RecvBuffer;
use crate::tag::MessageTag;

/// Index of a thread object in its runtime's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub usize);

/// Scheduling state of a thread object.
///
/// Transitions: `Idle → Ready` (insertion/unblock), `Ready → Running`
/// (selection), `Running → {Ready, Blocked, Dormant}` (own run step),
/// `Blocked → Ready` (unblock). `Dormant` is terminal for scheduling; the
/// object itself is destroyed only at rank shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Idle,
    Ready,
    Blocked,
    Running,
    Dormant,
}

/// What a thread's run step tells the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Step complete; re-arm the receive and wait for the next message.
    RunOk,
    /// Leave the thread blocked without re-arm bookkeeping.
    RunBlock,
    /// Retire the thread after its pre-exit action.
    RunExit,
}

/// Diagnostic color attached to a thread for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagColor {
    Plain,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
}

impl DiagColor {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagColor::Plain => "plain",
            DiagColor::Red => "red",
            DiagColor::Green => "green",
            DiagColor::Yellow => "yellow",
            DiagColor::Blue => "blue",
            DiagColor::Magenta => "magenta",
            DiagColor::Cyan => "cyan",
        }
    }
}

/// Scheduling attributes and receive slot of one thread object.
///
/// Role behavior lives in the runtime's role table; this struct is the part
/// the thread queue operates on.
#[derive(Debug)]
pub struct ThreadCore {
    pub name: &'static str,
    pub color: DiagColor,
    /// Static priority; weighted disciplines scale wait time by it.
    pub priority: f64,
    pub state: ThreadState,
    /// Bound routing tag; `MessageTag::NULL` for threads without a receive.
    pub tag: MessageTag,
    pub buffer: RecvBuffer,
    /// Last time this thread was selected to run.
    pub(crate) last_run: f64,
    /// Insertion serial assigned by the queue; breaks priority ties.
    pub(crate) serial: u64,
    /// Accumulated observed run time, for diagnostics.
    pub(crate) total_run: f64,
}

impl ThreadCore {
    /// A message-triggered thread: starts Blocked, waiting for its tag.
    pub fn message_triggered(
        name: &'static str,
        color: DiagColor,
        priority: f64,
        tag: MessageTag,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            name,
            color,
            priority,
            state: ThreadState::Blocked,
            tag,
            buffer: RecvBuffer::new(buffer_capacity),
            last_run: 0.0,
            serial: 0,
            total_run: 0.0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ThreadState::Ready
    }

    /// Total observed run time charged via `update_priority`.
    pub fn total_run(&self) -> f64 {
        self.total_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_triggered_threads_start_blocked() {
        let core = ThreadCore::message_triggered("hub", DiagColor::Red, 1.0, MessageTag(2), 64);
        assert_eq!(core.state, ThreadState::Blocked);
        assert_eq!(core.buffer.capacity(), 64);
        assert!(!core.is_ready());
    }
}
