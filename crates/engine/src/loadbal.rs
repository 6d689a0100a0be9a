//! Donor/receiver bookkeeping and the hub's partner-selection heaps.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use rangier_transport::Rank;

// ── LoadBalPair ──────────────────────────────────────────────────────

/// How many ranks are currently willing to give away vs. receive work.
///
/// Pairs aggregate across the cluster by plain addition; subtraction undoes
/// a previous addition exactly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalPair {
    pub donors: u32,
    pub receivers: u32,
}

impl LoadBalPair {
    pub fn new(donors: u32, receivers: u32) -> Self {
        Self { donors, receivers }
    }

    /// A single rank's contribution to the cluster aggregate.
    pub fn of_rank(donor: bool, receiver: bool) -> Self {
        Self {
            donors: donor as u32,
            receivers: receiver as u32,
        }
    }
}

impl Add for LoadBalPair {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            donors: self.donors + rhs.donors,
            receivers: self.receivers + rhs.receivers,
        }
    }
}

impl AddAssign for LoadBalPair {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for LoadBalPair {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            donors: self.donors - rhs.donors,
            receivers: self.receivers - rhs.receivers,
        }
    }
}

impl SubAssign for LoadBalPair {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

// ── Worker heaps ─────────────────────────────────────────────────────

/// Heap entry wrapping a worker rank with an externally supplied key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerEntry<K> {
    pub key: K,
    pub rank: Rank,
}

impl<K: Ord> Ord for WorkerEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key).then(self.rank.cmp(&other.rank))
    }
}

impl<K: Ord> PartialOrd for WorkerEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Generic priority structure over worker ranks; O(log n) push/pop.
///
/// The ordering is carried entirely by the key type, not by comparison
/// overrides on the entries.
#[derive(Debug, Default)]
pub struct WorkerHeap<K: Ord> {
    heap: BinaryHeap<WorkerEntry<K>>,
}

impl<K: Ord> WorkerHeap<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, key: K, rank: Rank) {
        self.heap.push(WorkerEntry { key, rank });
    }

    pub fn pop(&mut self) -> Option<WorkerEntry<K>> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&WorkerEntry<K>> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

/// Key ordering workers by current load; the top of the heap is the most
/// loaded worker, the natural donor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadKey(pub f64);

impl Eq for LoadKey {}

impl Ord for LoadKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for LoadKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Key ordering workers by incumbent quality for a minimization search; the
/// top of the heap is the quality leader (lowest objective value).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityKey(pub f64);

impl Eq for QualityKey {}

impl Ord for QualityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: lower objective value sorts higher.
        other.0.total_cmp(&self.0)
    }
}

impl PartialOrd for QualityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Hub heap of workers by load.
pub type WorkerInHeap = WorkerHeap<LoadKey>;

/// Hub heap of workers by incumbent quality.
pub type WorkerInQHeap = WorkerHeap<QualityKey>;
