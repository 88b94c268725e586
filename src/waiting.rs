//! Waiting-list strategies
//!
//! The frontier of pending work behind one small interface: `add` takes an
//! item and the weight the kernel computed for it, `next` removes the item
//! the strategy elects. Six strategies:
//!
//! - **FIFO / LIFO** — plain breadth- and depth-first order; weights are
//!   ignored.
//! - **Heuristic** — min-weight priority queue.
//! - **Heuristic-stack** — a stack fed through a staging priority queue:
//!   `add` goes to the stage; the first `next` after any adds flushes the
//!   whole stage onto the stack, lowest weight pushed last so it pops
//!   first. Depth-first shape, weight-ordered within each frontier burst.
//! - **Random / random-stack** — the same two structures with weights drawn
//!   from an owned, seeded PRNG instead of the kernel's heuristic.
//!
//! Every weighted entry carries a monotone sequence number as the tie
//! break, so for a fixed strategy (and seed, for the random pair) `next`
//! is a deterministic function of the insertion sequence.
//!
//! There is exactly one weighted wrapper type with exactly one payload
//! field; strategies cannot disagree about where the payload lives.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::SearchOrder;

/// A staged item: payload plus the weight and age deciding its turn.
struct Weighted<T> {
    weight: i32,
    seq: u64,
    item: T,
}

// `BinaryHeap` is a max-heap; order reversed so the smallest (weight, seq)
// surfaces first.
impl<T> Ord for Weighted<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.weight.cmp(&self.weight).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl<T> PartialOrd for Weighted<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> PartialEq for Weighted<T> {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.seq == other.seq
    }
}
impl<T> Eq for Weighted<T> {}

/// Frontier container with a pluggable removal order.
pub enum WaitingList<T> {
    Queue(VecDeque<T>),
    Stack(Vec<T>),
    Heap {
        heap: BinaryHeap<Weighted<T>>,
        seq: u64,
    },
    StagedStack {
        stage: BinaryHeap<Weighted<T>>,
        stack: Vec<T>,
        seq: u64,
    },
    RandomHeap {
        heap: BinaryHeap<Weighted<T>>,
        rng: StdRng,
        seq: u64,
    },
    RandomStagedStack {
        stage: BinaryHeap<Weighted<T>>,
        stack: Vec<T>,
        rng: StdRng,
        seq: u64,
    },
}

impl<T> WaitingList<T> {
    pub fn new(order: SearchOrder, seed: u64) -> Self {
        match order {
            SearchOrder::Bfs => WaitingList::Queue(VecDeque::new()),
            SearchOrder::Dfs => WaitingList::Stack(Vec::new()),
            SearchOrder::Heuristic => WaitingList::Heap { heap: BinaryHeap::new(), seq: 0 },
            SearchOrder::HeuristicStack => {
                WaitingList::StagedStack { stage: BinaryHeap::new(), stack: Vec::new(), seq: 0 }
            }
            SearchOrder::Random => WaitingList::RandomHeap {
                heap: BinaryHeap::new(),
                rng: StdRng::seed_from_u64(seed),
                seq: 0,
            },
            SearchOrder::RandomStack => WaitingList::RandomStagedStack {
                stage: BinaryHeap::new(),
                stack: Vec::new(),
                rng: StdRng::seed_from_u64(seed),
                seq: 0,
            },
        }
    }

    /// Queue `item`. `weight` is the kernel's heuristic for it; the FIFO,
    /// LIFO and random strategies disregard it.
    pub fn add(&mut self, weight: i32, item: T) {
        match self {
            WaitingList::Queue(q) => q.push_back(item),
            WaitingList::Stack(s) => s.push(item),
            WaitingList::Heap { heap, seq } => {
                heap.push(Weighted { weight, seq: *seq, item });
                *seq += 1;
            }
            WaitingList::StagedStack { stage, seq, .. } => {
                stage.push(Weighted { weight, seq: *seq, item });
                *seq += 1;
            }
            WaitingList::RandomHeap { heap, rng, seq } => {
                heap.push(Weighted { weight: rng.gen(), seq: *seq, item });
                *seq += 1;
            }
            WaitingList::RandomStagedStack { stage, rng, seq, .. } => {
                stage.push(Weighted { weight: rng.gen(), seq: *seq, item });
                *seq += 1;
            }
        }
    }

    /// Remove and return the next item, `None` when empty.
    pub fn next(&mut self) -> Option<T> {
        match self {
            WaitingList::Queue(q) => q.pop_front(),
            WaitingList::Stack(s) => s.pop(),
            WaitingList::Heap { heap, .. } | WaitingList::RandomHeap { heap, .. } => {
                heap.pop().map(|w| w.item)
            }
            WaitingList::StagedStack { stage, stack, .. }
            | WaitingList::RandomStagedStack { stage, stack, .. } => {
                flush(stage, stack);
                stack.pop()
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WaitingList::Queue(q) => q.len(),
            WaitingList::Stack(s) => s.len(),
            WaitingList::Heap { heap, .. } | WaitingList::RandomHeap { heap, .. } => heap.len(),
            WaitingList::StagedStack { stage, stack, .. }
            | WaitingList::RandomStagedStack { stage, stack, .. } => stage.len() + stack.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Move the whole stage onto the stack, highest weight first, so the
/// lightest entry ends on top.
fn flush<T>(stage: &mut BinaryHeap<Weighted<T>>, stack: &mut Vec<T>) {
    if stage.is_empty() {
        return;
    }
    let mut drained = Vec::with_capacity(stage.len());
    while let Some(w) = stage.pop() {
        drained.push(w.item); // ascending (weight, seq)
    }
    while let Some(item) = drained.pop() {
        stack.push(item); // descending: lightest lands last
    }
}

// ============================================================================
// Tests
// ============================================================================
