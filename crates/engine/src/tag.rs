//! Process-wide message tag allocation.
//!
//! Tags are the sole demultiplexing key for incoming envelopes: every
//! message-triggered activity binds exactly one tag at startup. Tags are
//! never reclaimed — issuance is strictly monotonic for the life of the
//! allocator, so a stale sender can never be misrouted to a newer receiver.

use serde::{Deserialize, Serialize};

/// A routing tag, unique within a process for the allocator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageTag(pub u32);

impl MessageTag {
    /// Reserved no-op tag. Never issued and never matched by any role.
    pub const NULL: MessageTag = MessageTag(0);

    /// Reserved wildcard tag, used only by capacity probes.
    pub const ANY: MessageTag = MessageTag(1);

    /// First value `issue()` can return.
    pub const FIRST_FREE: u32 = 2;
}

impl std::fmt::Display for MessageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic tag allocator for one rank's runtime.
///
/// The ceiling comes from the transport (`Transport::max_tag`). Running out
/// of tags is a configuration error — too many roles for the transport's tag
/// space — so `issue` aborts rather than returning a recoverable error.
#[derive(Debug)]
pub struct TagAllocator {
    next: u32,
    max_tag: u32,
}

impl TagAllocator {
    /// Create an allocator that will never issue a tag above `max_tag`.
    pub fn new(max_tag: u32) -> Self {
        Self {
            next: MessageTag::FIRST_FREE,
            max_tag,
        }
    }

    /// Issue a fresh tag, strictly greater than every tag issued before.
    ///
    /// # Panics
    /// Aborts the rank if the transport's tag space is exhausted.
    pub fn issue(&mut self) -> MessageTag {
        assert!(
            self.check_capacity(),
            "message tag space exhausted: next tag {} would exceed transport ceiling {}",
            self.next,
            self.max_tag,
        );
        let tag = MessageTag(self.next);
        self.next += 1;
        tag
    }

    /// Whether the tag space still has room for the next issuance.
    pub fn check_capacity(&self) -> bool {
        self.next <= self.max_tag
    }

    /// Restart allocation at the first non-sentinel value.
    ///
    /// Only valid at a controlled re-initialization point between
    /// independent runs, with no outstanding tag still in use.
    pub fn reset_all(&mut self) {
        self.next = MessageTag::FIRST_FREE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_distinct_and_increasing() {
        let mut alloc = TagAllocator::new(100);
        let tags: Vec<MessageTag> = (0..5).map(|_| alloc.issue()).collect();

        for pair in tags.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        for tag in &tags {
            assert_ne!(*tag, MessageTag::NULL);
            assert_ne!(*tag, MessageTag::ANY);
        }
    }

    #[test]
    fn first_issued_tag_is_first_non_sentinel() {
        let mut alloc = TagAllocator::new(10);
        assert_eq!(alloc.issue(), MessageTag(MessageTag::FIRST_FREE));
    }

    #[test]
    fn capacity_probe_tracks_exhaustion() {
        let mut alloc = TagAllocator::new(3);
        assert!(alloc.check_capacity());
        alloc.issue(); // 2
        alloc.issue(); // 3
        assert!(!alloc.check_capacity());
    }

    #[test]
    #[should_panic(expected = "message tag space exhausted")]
    fn issue_past_capacity_aborts() {
        let mut alloc = TagAllocator::new(2);
        alloc.issue();
        alloc.issue();
    }

    #[test]
    fn reset_all_restarts_allocation() {
        let mut alloc = TagAllocator::new(10);
        alloc.issue();
        alloc.issue();
        alloc.reset_all();
        assert_eq!(alloc.issue(), MessageTag(MessageTag::FIRST_FREE));
    }
}
