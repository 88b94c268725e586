//! Search kernels
//!
//! ## Shape
//! Every exhaustive mode is a waiting-list loop over the marking arena:
//! pop, evaluate, expand, insert the fresh successors, repeat until the
//! verdict settles, the frontier drains, a budget trips, or the caller
//! cancels. Exploration order is entirely the waiting-list strategy's
//! business; for a fixed input the *set* of markings eventually stored is
//! strategy-independent, only the order (and therefore the time to a
//! verdict) moves.
//!
//! ## Modes
//! - **Reachability** (`EF`/`AG`): unit-delay successors interleaved with
//!   transition firings, or time-dart bases when the option is set. `AG φ`
//!   runs as a hunt for a `¬φ` witness.
//! - **Liveness** (`EG`/`AF`): depth-first search through φ-satisfying
//!   markings; a lasso back onto the search path or a φ-deadlock is a
//!   witness for `EG`. `AF φ` is decided as the dual of `EG ¬φ`.
//! - **Workflow**: structural classification (MTAWFN / ETAWFN / not a
//!   workflow net) followed by a soundness sweep — every terminal marking
//!   must be exactly one token in the sink, and every explored marking
//!   must be able to reach a final one.
//!
//! ## Interruption
//! The cancel flag and both budgets are checked at the top of each loop
//! iteration; all three resolve to `Verdict::Unknown` with the reason, and
//! a verdict once set is never revisited. Invariant-violating delay
//! successors are dropped locally and counted — nothing escapes.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::dart;
use crate::marking::Marking;
use crate::model::{PlaceIdx, Tapn, TransIdx};
use crate::pwlist::{NodeId, PassedList, Step};
use crate::query::{
    self, eval, liveness_weight, negate, normalize, reach_weight, Expr, Quantifier, Query,
    QueryError,
};
use crate::successor::{successors, urgent_enabled};
use crate::waiting::WaitingList;
use crate::{SearchOrder, StopReason, Verdict, VerificationMode, VerificationOptions};

/// Counters every kernel maintains and reports.
#[derive(Clone, Debug)]
pub struct SearchStats {
    /// Markings popped and evaluated.
    pub explored: u64,
    /// Deduplicated markings stored in the arena.
    pub stored: u64,
    /// Successors generated per transition, index-aligned with the net.
    pub fired: Vec<u64>,
    /// Successors dropped because a delay violated an invariant.
    pub dropped: u64,
    /// High-water mark of the waiting list.
    pub peak_waiting: usize,
}

impl SearchStats {
    fn new(transitions: usize) -> Self {
        Self { explored: 0, stored: 0, fired: vec![0; transitions], dropped: 0, peak_waiting: 0 }
    }
}

/// One entry of a reconstructed witness path; the root carries no step.
#[derive(Clone, Debug)]
pub struct TraceStep {
    pub step: Option<Step>,
    pub marking: Marking,
}

/// Result of an exhaustive verification.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub verdict: Verdict,
    pub trace: Option<Vec<TraceStep>>,
    pub stats: SearchStats,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("{0:?} queries are not decided by {1:?} verification")]
    UnsupportedQuantifier(Quantifier, VerificationMode),
}

/// Run the verification mode selected in `options` for `query`.
pub fn verify(
    net: &Tapn,
    initial: &Marking,
    query: &Query,
    options: &VerificationOptions,
) -> Result<Outcome, SearchError> {
    query.check(net)?;
    match (options.mode, query.quantifier) {
        (VerificationMode::Reachability, Quantifier::Ef | Quantifier::Ag) => {
            Ok(reachability(net, initial, query, options))
        }
        (VerificationMode::Liveness, Quantifier::Eg | Quantifier::Af) => {
            Ok(liveness(net, initial, query, options))
        }
        (mode, q) => Err(SearchError::UnsupportedQuantifier(q, mode)),
    }
}

// ============================================================================
// Budgets
// ============================================================================

struct Budget {
    deadline: Option<Instant>,
    steps: Option<u64>,
}

impl Budget {
    fn from_options(options: &VerificationOptions) -> Self {
        Self { deadline: options.time_bound.map(|d| Instant::now() + d), steps: options.step_bound }
    }

    fn exceeded(&self, explored: u64) -> Option<StopReason> {
        if let Some(limit) = self.steps {
            if explored >= limit {
                return Some(StopReason::StepBudget);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(StopReason::TimeBudget);
            }
        }
        None
    }
}

/// Per-place permission to shed dead tokens: never in places the query
/// observes (shedding changes their counts), and only when the option
/// allows it at all.
fn shed_vector(net: &Tapn, observed: &[PlaceIdx], options: &VerificationOptions) -> Option<Vec<bool>> {
    if options.keep_dead_tokens {
        return None;
    }
    let mut shed = vec![true; net.num_places()];
    for p in observed {
        shed[p.as_usize()] = false;
    }
    Some(shed)
}

fn trace_of(passed: &PassedList, witness: NodeId) -> Vec<TraceStep> {
    passed
        .path_to(witness)
        .into_iter()
        .map(|(step, node)| TraceStep { step, marking: node.marking.clone() })
        .collect()
}

// ============================================================================
// Reachability (EF / AG)
// ============================================================================

fn reachability(
    net: &Tapn,
    initial: &Marking,
    query: &Query,
    options: &VerificationOptions,
) -> Outcome {
    // Both quantifiers hunt for one satisfying marking; AG hunts for a
    // counterexample of the negated body.
    let (target, on_hit, on_exhaust) = match query.quantifier {
        Quantifier::Ef => (normalize(&query.body), Verdict::Holds, Verdict::Fails),
        Quantifier::Ag => (negate(&query.body), Verdict::Fails, Verdict::Holds),
        _ => unreachable!("dispatched in verify()"),
    };
    let shed = shed_vector(net, &target.places(), options);
    let shed = shed.as_deref();

    let mut passed = PassedList::new();
    let mut waiting: WaitingList<NodeId> = WaitingList::new(options.order, options.seed);
    let mut stats = SearchStats::new(net.num_transitions());
    let budget = Budget::from_options(options);

    let mut root = initial.clone();
    root.cut(net, shed);
    let (_, root) = passed.insert(root, None, None);
    stats.stored = 1;
    waiting.add(reach_weight(&target, passed.marking(root)), root);

    let mut verdict = None;
    let mut witness = None;

    while verdict.is_none() {
        if options.cancel.is_cancelled() {
            verdict = Some(Verdict::Unknown(StopReason::Cancelled));
            break;
        }
        if let Some(reason) = budget.exceeded(stats.explored) {
            verdict = Some(Verdict::Unknown(reason));
            break;
        }
        let id = match waiting.next() {
            Some(id) => id,
            None => break,
        };
        stats.explored += 1;

        let marking = passed.marking(id).clone();
        if eval(&target, &marking) {
            verdict = Some(on_hit);
            witness = Some(id);
            break;
        }

        let mut push = |passed: &mut PassedList,
                        waiting: &mut WaitingList<NodeId>,
                        stats: &mut SearchStats,
                        mut succ: Marking,
                        step: Step| {
            succ.cut(net, shed);
            let (is_new, cid) = passed.insert(succ, Some(id), Some(step));
            if is_new {
                stats.stored += 1;
                waiting.add(reach_weight(&target, passed.marking(cid)), cid);
            }
        };

        if options.time_darts {
            let dart = dart::generate(net, &marking);
            for firing in dart.firings {
                stats.fired[firing.transition.as_usize()] += 1;
                push(
                    &mut passed,
                    &mut waiting,
                    &mut stats,
                    firing.marking,
                    Step::Fire { transition: firing.transition, delay: firing.delay },
                );
            }
        } else {
            if !urgent_enabled(net, &marking) {
                match marking.delayed(1, net) {
                    Ok(delayed) => {
                        push(&mut passed, &mut waiting, &mut stats, delayed, Step::Delay(1))
                    }
                    Err(_) => stats.dropped += 1,
                }
            }
            for t in 0..net.num_transitions() {
                let t = TransIdx(t);
                for succ in successors(net, &marking, t) {
                    stats.fired[t.as_usize()] += 1;
                    push(
                        &mut passed,
                        &mut waiting,
                        &mut stats,
                        succ,
                        Step::Fire { transition: t, delay: 0 },
                    );
                }
            }
        }
        stats.peak_waiting = stats.peak_waiting.max(waiting.len());
    }

    let verdict = verdict.unwrap_or(on_exhaust);
    debug!(
        ?verdict,
        explored = stats.explored,
        stored = stats.stored,
        "reachability settled"
    );
    let trace = if options.trace { witness.map(|w| trace_of(&passed, w)) } else { None };
    Outcome { verdict, trace, stats }
}

// ============================================================================
// Liveness (EG / AF)
// ============================================================================

/// Node colour during the liveness DFS.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Colour {
    OnPath,
    Done,
}

fn liveness(
    net: &Tapn,
    initial: &Marking,
    query: &Query,
    options: &VerificationOptions,
) -> Outcome {
    // EG ψ directly; AF φ as the dual of EG ¬φ.
    let (psi, on_hit, on_exhaust) = match query.quantifier {
        Quantifier::Eg => (normalize(&query.body), Verdict::Holds, Verdict::Fails),
        Quantifier::Af => (negate(&query.body), Verdict::Fails, Verdict::Holds),
        _ => unreachable!("dispatched in verify()"),
    };
    let shed = shed_vector(net, &psi.places(), options);
    let shed = shed.as_deref();

    let mut stats = SearchStats::new(net.num_transitions());
    let budget = Budget::from_options(options);
    let mut rng = StdRng::seed_from_u64(options.seed);

    let mut root = initial.clone();
    root.cut(net, shed);
    if !eval(&psi, &root) {
        return Outcome { verdict: on_exhaust, trace: None, stats };
    }

    let mut passed = PassedList::new();
    let (_, root) = passed.insert(root, None, None);
    stats.stored = 1;
    let mut colour: Vec<Option<Colour>> = vec![Some(Colour::OnPath)];

    // A frame owns the ψ-successors of its node, pre-ordered per strategy.
    struct Frame {
        id: NodeId,
        succs: Vec<NodeId>,
        next: usize,
    }

    // Expands `id`, inserting ψ-satisfying successors. Returns the frame
    // and whether the node has any successor at all (ψ or not).
    let mut expand = |id: NodeId,
                      passed: &mut PassedList,
                      colour: &mut Vec<Option<Colour>>,
                      stats: &mut SearchStats,
                      rng: &mut StdRng|
     -> (Frame, bool) {
        let marking = passed.marking(id).clone();
        let mut any = false;
        let mut succs: Vec<NodeId> = Vec::new();
        let mut weights: Vec<i32> = Vec::new();

        let mut note = |succ: Marking, step: Step, passed: &mut PassedList, stats: &mut SearchStats| {
            let mut succ = succ;
            succ.cut(net, shed);
            if !eval(&psi, &succ) {
                return;
            }
            let w = liveness_weight(&psi, &succ);
            let (is_new, cid) = passed.insert(succ, Some(id), Some(step));
            if is_new {
                stats.stored += 1;
            }
            if !succs.contains(&cid) {
                succs.push(cid);
                weights.push(w);
            }
        };

        if !urgent_enabled(net, &marking) {
            match marking.delayed(1, net) {
                Ok(delayed) => {
                    any = true;
                    note(delayed, Step::Delay(1), passed, stats);
                }
                Err(_) => stats.dropped += 1,
            }
        }
        for t in 0..net.num_transitions() {
            let t = TransIdx(t);
            for succ in successors(net, &marking, t) {
                stats.fired[t.as_usize()] += 1;
                any = true;
                note(succ, Step::Fire { transition: t, delay: 0 }, passed, stats);
            }
        }

        // Strategy decides sibling order; the stack itself provides depth.
        let mut order: Vec<usize> = (0..succs.len()).collect();
        match options.order {
            SearchOrder::Bfs | SearchOrder::Dfs => {}
            SearchOrder::Heuristic | SearchOrder::HeuristicStack => {
                order.sort_by_key(|&i| weights[i]);
            }
            SearchOrder::Random | SearchOrder::RandomStack => order.shuffle(rng),
        }
        let succs: Vec<NodeId> = order.into_iter().map(|i| succs[i]).collect();

        colour.resize(passed.len(), None);
        (Frame { id, succs, next: 0 }, any)
    };

    stats.explored += 1;
    let (frame, any) = expand(root, &mut passed, &mut colour, &mut stats, &mut rng);
    let mut verdict = None;
    let mut witness = None;
    if !any {
        // ψ-deadlock at the root: the only maximal run satisfies ψ forever.
        verdict = Some(on_hit);
        witness = Some(root);
    }

    let mut stack: Vec<Frame> = vec![frame];

    while verdict.is_none() {
        if options.cancel.is_cancelled() {
            verdict = Some(Verdict::Unknown(StopReason::Cancelled));
            break;
        }
        if let Some(reason) = budget.exceeded(stats.explored) {
            verdict = Some(Verdict::Unknown(reason));
            break;
        }
        let Some(frame) = stack.last_mut() else { break };
        if frame.next >= frame.succs.len() {
            colour[frame.id.as_usize()] = Some(Colour::Done);
            stack.pop();
            continue;
        }
        let next = frame.succs[frame.next];
        frame.next += 1;

        match colour[next.as_usize()] {
            Some(Colour::OnPath) => {
                // Lasso: a ψ-run returning onto the search path.
                verdict = Some(on_hit);
                witness = Some(next);
            }
            Some(Colour::Done) => {}
            None => {
                colour[next.as_usize()] = Some(Colour::OnPath);
                stats.explored += 1;
                let (frame, any) = expand(next, &mut passed, &mut colour, &mut stats, &mut rng);
                if !any {
                    verdict = Some(on_hit);
                    witness = Some(next);
                } else {
                    stack.push(frame);
                }
                stats.peak_waiting = stats.peak_waiting.max(stack.len());
            }
        }
    }

    let verdict = verdict.unwrap_or(on_exhaust);
    debug!(?verdict, explored = stats.explored, stored = stats.stored, "liveness settled");
    let trace = if options.trace { witness.map(|w| trace_of(&passed, w)) } else { None };
    Outcome { verdict, trace, stats }
}

// ============================================================================
// Workflow soundness
// ============================================================================

/// Structural class of the net as a workflow.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkflowKind {
    /// Monotone workflow net: no urgency, invariants or inhibitors.
    Mtawfn,
    /// Extended workflow net: uses at least one of the above.
    Etawfn,
    NotAWorkflow,
}

#[derive(Clone, Debug)]
pub struct WorkflowOutcome {
    pub kind: WorkflowKind,
    /// `None` when the net is not a workflow or the sweep was interrupted.
    pub sound: Option<bool>,
    /// A dead marking or an uncovered marking refuting soundness.
    pub witness: Option<Vec<TraceStep>>,
    pub stats: SearchStats,
}

/// Classify and, for workflow nets, decide soundness.
pub fn workflow(net: &Tapn, initial: &Marking, options: &VerificationOptions) -> WorkflowOutcome {
    // Dead places are an optimisation marker; the analyser must observe
    // every token, so retype them on a private clone.
    let net = net.with_dead_places_retyped();
    let mut stats = SearchStats::new(net.num_transitions());

    let (kind, ports) = classify(&net, initial);
    let (_in_place, out_place) = match (kind, ports) {
        (WorkflowKind::NotAWorkflow, _) | (_, None) => {
            return WorkflowOutcome { kind: WorkflowKind::NotAWorkflow, sound: None, witness: None, stats }
        }
        (_, Some(ports)) => ports,
    };

    // Soundness sweep. Tokens are never shed here: a token left behind in
    // a corner of the net is precisely what refutes soundness.
    let budget = Budget::from_options(options);
    let mut passed = PassedList::new();
    let mut waiting: WaitingList<NodeId> = WaitingList::new(options.order, options.seed);
    let target = Expr::atom(out_place, query::CmpOp::Ge, 1);

    let (_, root) = passed.insert(initial.clone(), None, None);
    stats.stored = 1;
    waiting.add(reach_weight(&target, passed.marking(root)), root);

    let mut children: Vec<Vec<NodeId>> = vec![Vec::new()];
    let mut finals: Vec<NodeId> = Vec::new();
    let mut interrupted = false;

    while let Some(id) = {
        if options.cancel.is_cancelled() || budget.exceeded(stats.explored).is_some() {
            interrupted = true;
            None
        } else {
            waiting.next()
        }
    } {
        stats.explored += 1;
        let marking = passed.marking(id).clone();

        let mut kids: Vec<NodeId> = Vec::new();
        let mut any = false;
        let mut push = |passed: &mut PassedList,
                        waiting: &mut WaitingList<NodeId>,
                        stats: &mut SearchStats,
                        children: &mut Vec<Vec<NodeId>>,
                        mut succ: Marking,
                        step: Step| {
            succ.cut(&net, None);
            let (is_new, cid) = passed.insert(succ, Some(id), Some(step));
            if is_new {
                stats.stored += 1;
                children.push(Vec::new());
                waiting.add(reach_weight(&target, passed.marking(cid)), cid);
            }
            if !kids.contains(&cid) {
                kids.push(cid);
            }
        };

        if !urgent_enabled(&net, &marking) {
            match marking.delayed(1, &net) {
                Ok(delayed) => {
                    any = true;
                    push(&mut passed, &mut waiting, &mut stats, &mut children, delayed, Step::Delay(1));
                }
                Err(_) => stats.dropped += 1,
            }
        }
        for t in 0..net.num_transitions() {
            let t = TransIdx(t);
            for succ in successors(&net, &marking, t) {
                stats.fired[t.as_usize()] += 1;
                any = true;
                push(
                    &mut passed,
                    &mut waiting,
                    &mut stats,
                    &mut children,
                    succ,
                    Step::Fire { transition: t, delay: 0 },
                );
            }
        }
        stats.peak_waiting = stats.peak_waiting.max(waiting.len());

        let is_final = marking.total_count() == 1 && marking.count(out_place) == 1;
        if is_final {
            finals.push(id);
        } else if !any || kids.iter().all(|&k| k == id) {
            // Nothing but time saturation left and the sink was missed.
            debug!(marking = ?marking, "dead non-final marking");
            let witness = options.trace.then(|| trace_of(&passed, id));
            return WorkflowOutcome { kind, sound: Some(false), witness, stats };
        }
        children[id.as_usize()] = kids;
    }

    if interrupted {
        return WorkflowOutcome { kind, sound: None, witness: None, stats };
    }

    // Option to complete: every explored marking must reach some final one.
    let mut parents: Vec<Vec<NodeId>> = vec![Vec::new(); passed.len()];
    for (node, kids) in children.iter().enumerate() {
        for kid in kids {
            parents[kid.as_usize()].push(NodeId(node as u32));
        }
    }
    let mut covered = vec![false; passed.len()];
    let mut frontier: Vec<NodeId> = finals.clone();
    for f in &frontier {
        covered[f.as_usize()] = true;
    }
    while let Some(id) = frontier.pop() {
        for &p in &parents[id.as_usize()] {
            if !covered[p.as_usize()] {
                covered[p.as_usize()] = true;
                frontier.push(p);
            }
        }
    }
    if let Some(stuck) = covered.iter().position(|c| !c) {
        let witness = options.trace.then(|| trace_of(&passed, NodeId(stuck as u32)));
        return WorkflowOutcome { kind, sound: Some(false), witness, stats };
    }

    WorkflowOutcome { kind, sound: Some(true), witness: None, stats }
}

/// Port detection and structural classification.
fn classify(net: &Tapn, initial: &Marking) -> (WorkflowKind, Option<(PlaceIdx, PlaceIdx)>) {
    let count = net.num_places();
    let mut consuming = vec![false; count]; // some arc drains the place
    let mut producing = vec![false; count]; // some arc feeds the place
    let mut has_urgent = false;
    let mut has_inhibitor = false;

    for tr in net.transitions() {
        has_urgent |= tr.urgent;
        has_inhibitor |= !tr.inhibitors.is_empty();
        for arc in &tr.preset {
            consuming[arc.place.as_usize()] = true;
        }
        for arc in &tr.postset {
            producing[arc.place.as_usize()] = true;
        }
        for arc in &tr.transports {
            consuming[arc.source.as_usize()] = true;
            producing[arc.dest.as_usize()] = true;
        }
    }

    let mut has_invariant = false;
    let mut in_place = None;
    let mut out_place = None;
    for p in 0..count {
        if !consuming[p] && !producing[p] {
            continue; // unused place, not a port
        }
        let place = PlaceIdx(p);
        if net.place(place).invariant.bound().is_some() {
            has_invariant = true;
        }
        if !producing[p] {
            if in_place.replace(place).is_some() {
                return (WorkflowKind::NotAWorkflow, None);
            }
        }
        if !consuming[p] {
            if out_place.replace(place).is_some() {
                return (WorkflowKind::NotAWorkflow, None);
            }
        }
    }

    let (in_place, out_place) = match (in_place, out_place) {
        (Some(i), Some(o)) if i != o => (i, o),
        _ => return (WorkflowKind::NotAWorkflow, None),
    };

    if initial.total_count() != 1 || initial.count(in_place) != 1 {
        return (WorkflowKind::NotAWorkflow, None);
    }

    // Every transition must consume from somewhere.
    if net.transitions().iter().any(|tr| tr.consuming_arcs() == 0) {
        return (WorkflowKind::NotAWorkflow, None);
    }

    let kind = if has_urgent || has_invariant || has_inhibitor {
        WorkflowKind::Etawfn
    } else {
        WorkflowKind::Mtawfn
    };
    (kind, Some((in_place, out_place)))
}

// ============================================================================
// Tests
// ============================================================================
