//! Marking arena and passed set
//!
//! Every marking the kernels keep lives in one dense arena owned by the
//! running kernel; [`NodeId`] indices replace pointers everywhere. Parent
//! links and the step that produced a node live **next to** the marking in
//! its [`Node`], never inside it, so marking equality stays pure multiset
//! equality and the parent DAG cannot form ownership cycles. Teardown is
//! dropping the arena.
//!
//! The passed set maps a 64-bit fingerprint of the full token content to
//! the arena nodes carrying that fingerprint; a probe compares the actual
//! markings, so colliding fingerprints cost a bucket scan and nothing else.
//! Markings only flow in — there is no per-entry deletion.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::marking::Marking;
use crate::model::TransIdx;

/// Index of a stored marking in the arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);
impl NodeId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// How a node was produced from its parent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Pure time passage of the given number of units.
    Delay(u32),
    /// A transition firing, after waiting `delay` units at the parent.
    Fire { transition: TransIdx, delay: u32 },
}

/// An arena entry: the canonical marking plus its provenance.
#[derive(Clone, Debug)]
pub struct Node {
    pub marking: Marking,
    pub parent: Option<NodeId>,
    pub step: Option<Step>,
}

/// Arena plus fingerprint index; insert-or-lookup only.
pub struct PassedList {
    nodes: Vec<Node>,
    index: HashMap<u64, Vec<NodeId>>,
}

impl PassedList {
    pub fn new() -> Self {
        Self { nodes: Vec::new(), index: HashMap::new() }
    }

    /// Number of stored (deduplicated) markings.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.as_usize()]
    }

    #[inline]
    pub fn marking(&self, id: NodeId) -> &Marking {
        &self.nodes[id.as_usize()].marking
    }

    fn fingerprint(marking: &Marking) -> u64 {
        let mut h = DefaultHasher::new();
        marking.hash(&mut h);
        h.finish()
    }

    /// Insert-or-lookup. Returns `(true, id)` with a fresh node when the
    /// marking was new, `(false, id)` of the canonical twin otherwise (the
    /// first stored provenance wins; later paths to it are discarded).
    pub fn insert(
        &mut self,
        marking: Marking,
        parent: Option<NodeId>,
        step: Option<Step>,
    ) -> (bool, NodeId) {
        let fp = Self::fingerprint(&marking);
        let bucket = self.index.entry(fp).or_default();
        for &id in bucket.iter() {
            if self.nodes[id.as_usize()].marking == marking {
                return (false, id);
            }
        }
        let id = NodeId(self.nodes.len() as u32);
        bucket.push(id);
        self.nodes.push(Node { marking, parent, step });
        (true, id)
    }

    /// Walk `id` back to the root, returning the path root-first as
    /// `(step-into-node, node)` pairs; the root carries no step.
    pub fn path_to(&self, id: NodeId) -> Vec<(Option<Step>, &Node)> {
        let mut out = Vec::new();
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let node = self.node(cur);
            out.push((node.step, node));
            cursor = node.parent;
        }
        out.reverse();
        out
    }
}

impl Default for PassedList {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
