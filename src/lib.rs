//! Crate root: public surface, shared option records, and engine-wide
//! invariants
//!
//! `dtapn` decides reachability and related temporal properties of
//! discrete-time timed-arc Petri nets, either exhaustively over the marking
//! state space or statistically over sampled stochastic runs.
//!
//! ## Invariants (engine-wide)
//!
//! - **Discrete time.** Ages, interval bounds and invariants are integers;
//!   time passes in whole units in the exhaustive kernels. Only the
//!   statistical sampler works with real-valued ages, privately.
//!
//! - **Canonical markings.** Token lists are age-sorted with equal ages
//!   coalesced, so structural equality and hashing coincide with multiset
//!   equality. Ages clamp at `max_constant + 1` after every step — beyond
//!   every finite bound further aging is unobservable — which keeps the
//!   state space finite.
//!
//! - **Single ownership.** A kernel owns its passed set, waiting list and
//!   PRNG outright; markings live in one arena and refer to each other by
//!   index, never by pointer. The core performs no I/O and yields control
//!   only at cancellation checks and budget exhaustion.
//!
//! - **Failure discipline.** An invariant violation during time passage is
//!   an expected local event: the successor is dropped and counted, never
//!   surfaced. Budgets and cancellation fold into `Verdict::Unknown` with
//!   the reason. Only ill-formed inputs (unknown places, bad parameters)
//!   abort before a search starts. We forbid `unsafe` throughout.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Time-dart generation (enabledness boundaries, urgency truncation).
pub mod dart;
/// JSON descriptions of nets, markings and options (input collaborator).
pub mod format;
/// Aged-token multisets and canonicalisation.
pub mod marking;
/// The immutable timed-arc Petri net description.
pub mod model;
/// Marking arena and fingerprint-deduplicated passed set.
pub mod pwlist;
/// Query AST, parser, normalisation, evaluation and search weights.
pub mod query;
/// Exhaustive search kernels: reachability, liveness, workflow soundness.
pub mod search;
/// Statistical model checking: distributions, runs, SPRT, estimation.
pub mod smc;
/// Discrete successor generation.
pub mod successor;
/// Waiting-list strategies.
pub mod waiting;

// ============================================================================
// Canonical re-exports
// ============================================================================

pub use crate::marking::{InvariantViolated, Marking, Token};
pub use crate::model::{
    InhibitorArc, InputArc, Invariant, ModelError, OutputArc, Place, PlaceIdx, PlaceKind, Tapn,
    TimeInterval, TransIdx, TransportArc, Transition,
};
pub use crate::pwlist::{NodeId, Step};
pub use crate::query::{CmpOp, Expr, Quantifier, Query, QueryError};
pub use crate::search::{Outcome, SearchError, SearchStats, TraceStep, WorkflowKind, WorkflowOutcome};
pub use crate::smc::{FiringDistribution, Law, SmcOutcome, SmcResult, SmcSettings};

// ============================================================================
// Verdicts and options
// ============================================================================

/// Why a kernel stopped without settling the query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The caller raised the cancel flag.
    Cancelled,
    /// The explored-markings budget ran out.
    StepBudget,
    /// The wall-clock budget ran out.
    TimeBudget,
}

/// Three-valued outcome of a verification.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The query holds.
    Holds,
    /// The query does not hold.
    Fails,
    /// The search was interrupted before settling.
    Unknown(StopReason),
}

/// Removal order of the waiting list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SearchOrder {
    /// First in, first out — breadth first.
    Bfs,
    /// Last in, first out — depth first.
    Dfs,
    /// Min-weight priority order under the query-distance heuristic.
    Heuristic,
    /// Depth-first with weight-ordered frontier bursts.
    HeuristicStack,
    /// Priority order under seeded random weights.
    Random,
    /// Depth-first with randomly ordered frontier bursts.
    RandomStack,
}

/// Which kernel answers the query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VerificationMode {
    /// Exhaustive search for `EF` / `AG`.
    Reachability,
    /// Lasso search for `EG` / `AF`.
    Liveness,
    /// Workflow classification and soundness.
    Workflow,
    /// Statistical model checking.
    Smc,
}

/// Cooperative cancellation flag shared between a kernel and its caller.
/// Clones observe the same flag; kernels poll it at each loop top.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, unraised token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; the kernel returns `Unknown(Cancelled)` at its next
    /// loop top.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a verification run is parameterised by.
#[derive(Clone, Debug)]
pub struct VerificationOptions {
    /// Waiting-list strategy.
    pub order: SearchOrder,
    /// Kernel selection.
    pub mode: VerificationMode,
    /// Wall-clock budget for exhaustive kernels.
    pub time_bound: Option<Duration>,
    /// Explored-markings budget for exhaustive kernels.
    pub step_bound: Option<u64>,
    /// Reconstruct a witness trace when one exists.
    pub trace: bool,
    /// Keep tokens that can never again feed an arc. When false, such
    /// tokens are shed — except in places the query observes, whose counts
    /// must stay exact, and in workflow analysis, which keeps everything.
    pub keep_dead_tokens: bool,
    /// Explore time-dart bases instead of unit-delay chains.
    pub time_darts: bool,
    /// Master seed for random strategies and the statistical engine.
    pub seed: u64,
    /// Cooperative cancellation flag.
    pub cancel: CancelToken,
    /// Settings of the statistical engine, when mode is `Smc`.
    pub smc: Option<SmcSettings>,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            order: SearchOrder::Heuristic,
            mode: VerificationMode::Reachability,
            time_bound: None,
            step_bound: None,
            trace: false,
            keep_dead_tokens: false,
            time_darts: false,
            seed: 0,
            cancel: CancelToken::new(),
            smc: None,
        }
    }
}
