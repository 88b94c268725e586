//! Discrete successor generation
//!
//! For a marking `M` and a transition `t`, enumerate every marking reachable
//! by firing `t` once at the current ages. Time passage is not taken here;
//! the search kernels interleave unit delays (or time darts) themselves.
//!
//! The enumeration works per consuming arc (input and transport):
//!
//! 1. **Inhibitors** are checked first; a blocked transition yields nothing.
//! 2. **Enabling.** Each arc collects the sub-multiset of tokens in its
//!    source whose ages lie in the arc interval; transport arcs further
//!    require the destination invariant to accept the travelling age. An
//!    arc whose enabling multiset is smaller than its multiplicity yields
//!    nothing.
//! 3. **Modification vectors.** Each arc holds a sorted index vector (with
//!    repetition, bounded by per-token counts) into its enabling tokens —
//!    one slot per unit of multiplicity. Vectors advance in lexicographic
//!    order: the rightmost position that can move to an index with spare
//!    capacity does, and the suffix refills greedily from that index up.
//!    The full firing set is the odometer product across arcs, rightmost
//!    arc cycling fastest.
//! 4. **Apply.** Chosen input tokens are removed; transport tokens move to
//!    their destination with age preserved; postset tokens enter at age 0.
//!
//! Generation is pure: the source marking is never touched, and the result
//! is just a (possibly empty) vector. Coalesced equal-age tokens make the
//! enumeration canonical — choosing "which" of two age-3 tokens is not a
//! distinguishable choice, so it is never enumerated twice.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::marking::{Marking, Token};
use crate::model::{PlaceIdx, Tapn, TimeInterval, TransIdx, Transition};

/// One consuming arc prepared for enumeration.
struct Firing {
    source: PlaceIdx,
    /// Transport destination; `None` for plain input arcs.
    dest: Option<PlaceIdx>,
    enabled: Vec<Token>,
    mods: Vec<usize>,
}

/// Tokens of `place` enabling an arc with `interval`, optionally filtered
/// by a transport destination's invariant.
fn enabling(
    net: &Tapn,
    marking: &Marking,
    place: PlaceIdx,
    interval: &TimeInterval,
    dest: Option<PlaceIdx>,
) -> Vec<Token> {
    let bound = dest.map(|d| net.place(d).invariant);
    marking
        .tokens_in(place)
        .iter()
        .filter(|t| interval.contains(t.age) && bound.map_or(true, |b| b.permits(t.age)))
        .copied()
        .collect()
}

/// First (lexicographically least) index vector of length `mult`, or `None`
/// when the enabling multiset is too small.
fn first_vector(enabled: &[Token], mult: u32) -> Option<Vec<usize>> {
    let mut mods = Vec::with_capacity(mult as usize);
    let mut ix = 0usize;
    let mut left = enabled.get(0).map_or(0, |t| t.count);
    for _ in 0..mult {
        while left == 0 {
            ix += 1;
            left = enabled.get(ix)?.count;
        }
        mods.push(ix);
        left -= 1;
    }
    Some(mods)
}

/// Advance `mods` to the next sorted index vector in lexicographic order,
/// respecting per-token counts. Returns false (leaving `mods` unchanged)
/// when the current vector is the last one.
fn increment(mods: &mut [usize], enabled: &[Token]) -> bool {
    let n = enabled.len();
    let len = mods.len();
    let mut remaining: Vec<u32> = enabled.iter().map(|t| t.count).collect();
    for &ix in mods.iter() {
        remaining[ix] -= 1;
    }

    for i in (0..len).rev() {
        // Positions right of `i` were freed by earlier iterations.
        remaining[mods[i]] += 1;
        let mut next = mods[i] + 1;
        while next < n && remaining[next] == 0 {
            next += 1;
        }
        if next == n {
            continue; // carry further left
        }
        // Suffix needs `len - i` units from indices ≥ next; if they are not
        // there, no larger index helps either, so keep carrying.
        let available: u32 = remaining[next..].iter().sum();
        if (available as usize) < len - i {
            continue;
        }
        let mut fill = next;
        for slot in mods.iter_mut().skip(i) {
            while remaining[fill] == 0 {
                fill += 1;
            }
            remaining[fill] -= 1;
            *slot = fill;
        }
        return true;
    }
    false
}

/// Fast enabledness check: inhibitors clear and every consuming arc can
/// cover its multiplicity. Used for urgency tests and dart boundaries.
pub fn is_enabled(net: &Tapn, marking: &Marking, t: TransIdx) -> bool {
    let tr = net.transition(t);
    if inhibited(marking, tr) {
        return false;
    }
    for arc in &tr.preset {
        let have: u32 =
            enabling(net, marking, arc.place, &arc.interval, None).iter().map(|t| t.count).sum();
        if have < arc.mult {
            return false;
        }
    }
    for arc in &tr.transports {
        let have: u32 = enabling(net, marking, arc.source, &arc.interval, Some(arc.dest))
            .iter()
            .map(|t| t.count)
            .sum();
        if have < arc.mult {
            return false;
        }
    }
    true
}

/// Enabledness of every transition, index-aligned with the net.
pub fn enabled_vector(net: &Tapn, marking: &Marking) -> Vec<bool> {
    (0..net.num_transitions()).map(|i| is_enabled(net, marking, TransIdx(i))).collect()
}

/// Whether some urgent transition is enabled (blocks time passage).
pub fn urgent_enabled(net: &Tapn, marking: &Marking) -> bool {
    (0..net.num_transitions())
        .any(|i| net.transitions()[i].urgent && is_enabled(net, marking, TransIdx(i)))
}

fn inhibited(marking: &Marking, tr: &Transition) -> bool {
    tr.inhibitors.iter().any(|arc| marking.count(arc.place) >= arc.weight)
}

/// Every marking reachable by firing `t` once from `marking`.
pub fn successors(net: &Tapn, marking: &Marking, t: TransIdx) -> Vec<Marking> {
    let tr = net.transition(t);
    if inhibited(marking, tr) {
        return Vec::new();
    }

    let mut firings: Vec<Firing> = Vec::with_capacity(tr.consuming_arcs());
    for arc in &tr.preset {
        let enabled = enabling(net, marking, arc.place, &arc.interval, None);
        match first_vector(&enabled, arc.mult) {
            Some(mods) => firings.push(Firing { source: arc.place, dest: None, enabled, mods }),
            None => return Vec::new(),
        }
    }
    for arc in &tr.transports {
        let enabled = enabling(net, marking, arc.source, &arc.interval, Some(arc.dest));
        match first_vector(&enabled, arc.mult) {
            Some(mods) => {
                firings.push(Firing { source: arc.source, dest: Some(arc.dest), enabled, mods })
            }
            None => return Vec::new(),
        }
    }

    let mut out = Vec::new();
    loop {
        if let Some(next) = apply(marking, tr, &firings) {
            out.push(next);
        }
        // Odometer across arcs: rightmost arc advances first; exhausted
        // arcs reset to their first vector and carry left.
        let mut advanced = false;
        for i in (0..firings.len()).rev() {
            let f = &mut firings[i];
            if increment(&mut f.mods, &f.enabled) {
                advanced = true;
                break;
            }
            f.mods = match first_vector(&f.enabled, f.mods.len() as u32) {
                Some(mods) => mods,
                None => return out,
            };
        }
        if !advanced {
            return out;
        }
    }
}

/// Build the successor for one firing choice. Returns `None` when two arcs
/// reading the same place over-consume a shared token run.
fn apply(marking: &Marking, tr: &Transition, firings: &[Firing]) -> Option<Marking> {
    let mut next = marking.clone();
    for f in firings {
        for &ix in &f.mods {
            let age = f.enabled[ix].age;
            if !next.remove(f.source, age, 1) {
                return None;
            }
            if let Some(dest) = f.dest {
                next.add(dest, Token { age, count: 1 });
            }
        }
    }
    for arc in &tr.postset {
        next.add(arc.place, Token { age: 0, count: arc.mult });
    }
    Some(next)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        InhibitorArc, InputArc, Invariant, OutputArc, Place, TimeInterval, TransportArc,
        Transition,
    };

    fn interval(lo: u32, hi: u32) -> TimeInterval {
        TimeInterval::new(lo, Some(hi)).unwrap()
    }

    fn place(name: &str) -> Place {
        Place::new(name, Invariant::Unbounded)
    }

    fn token(age: u32, count: u32) -> Token {
        Token { age, count }
    }

    #[test]
    fn increment_walks_multiset_combinations_in_order() {
        // Counts [2, 2, 1]: the 3-combinations of {0², 1², 2} in order.
        let enabled = vec![token(10, 2), token(11, 2), token(12, 1)];
        let mut mods = first_vector(&enabled, 3).unwrap();
        let mut seen = vec![mods.clone()];
        while increment(&mut mods, &enabled) {
            seen.push(mods.clone());
        }
        assert_eq!(
            seen,
            vec![vec![0, 0, 1], vec![0, 0, 2], vec![0, 1, 1], vec![0, 1, 2], vec![1, 1, 2]]
        );
        // Exhausted: the vector stays put.
        assert!(!increment(&mut mods, &enabled));
        assert_eq!(mods, vec![1, 1, 2]);

        // Insufficient supply is detected up front.
        assert!(first_vector(&enabled, 6).is_none());
        assert!(first_vector(&[], 1).is_none());
    }

    #[test]
    fn basic_fire_moves_token_downstream() {
        // S1 net: p0 --[0,0]--> t --> p1.
        let mut t = Transition::new("t");
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(0, 0), mult: 1 });
        t.postset.push(OutputArc { place: PlaceIdx(1), mult: 1 });
        let net = Tapn::new(vec![place("p0"), place("p1")], vec![t]).unwrap();

        let mut m = Marking::new(2);
        m.add(PlaceIdx(0), token(0, 1));
        let before = m.clone();

        let succs = successors(&net, &m, TransIdx(0));
        assert_eq!(m, before, "generation must not disturb the source");
        assert_eq!(succs.len(), 1);
        assert_eq!(succs[0].count(PlaceIdx(0)), 0);
        assert_eq!(succs[0].tokens_in(PlaceIdx(1)), &[token(0, 1)]);

        // Aged out of the interval: nothing fires.
        let aged = m.delayed(1, &net).unwrap();
        assert!(successors(&net, &aged, TransIdx(0)).is_empty());
    }

    #[test]
    fn inhibitor_blocks_firing() {
        // S2: same net plus inhibitor p0 -o t with weight 1.
        let mut t = Transition::new("t");
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(0, 0), mult: 1 });
        t.postset.push(OutputArc { place: PlaceIdx(1), mult: 1 });
        t.inhibitors.push(InhibitorArc { place: PlaceIdx(0), weight: 1 });
        let net = Tapn::new(vec![place("p0"), place("p1")], vec![t]).unwrap();

        let mut m = Marking::new(2);
        m.add(PlaceIdx(0), token(0, 1));
        assert!(successors(&net, &m, TransIdx(0)).is_empty());
        assert!(!is_enabled(&net, &m, TransIdx(0)));
    }

    #[test]
    fn transport_preserves_age_under_destination_invariant() {
        // S3: p0 =[1,3]=> t => p1 with invariant ≤ 2 on p1.
        let mut t = Transition::new("t");
        t.transports.push(TransportArc {
            source: PlaceIdx(0),
            dest: PlaceIdx(1),
            interval: interval(1, 3),
            mult: 1,
        });
        let net = Tapn::new(
            vec![place("p0"), Place::new("p1", Invariant::AtMost(2))],
            vec![t],
        )
        .unwrap();

        let mut m = Marking::new(2);
        m.add(PlaceIdx(0), token(0, 1));

        // Age 0: below the interval.
        assert!(successors(&net, &m, TransIdx(0)).is_empty());

        // Age 1: travels, age preserved.
        let m1 = m.delayed(1, &net).unwrap();
        let succs = successors(&net, &m1, TransIdx(0));
        assert_eq!(succs.len(), 1);
        assert_eq!(succs[0].tokens_in(PlaceIdx(1)), &[token(1, 1)]);

        // Age 3: inside the arc interval but rejected by the destination.
        let m3 = m.delayed(3, &net).unwrap();
        assert!(successors(&net, &m3, TransIdx(0)).is_empty());
        assert!(!is_enabled(&net, &m3, TransIdx(0)));
    }

    #[test]
    fn coalesced_tokens_yield_one_combination() {
        // S4: two arcs from the same place, two age-0 tokens. The pairing
        // is not a distinguishable choice, so exactly one successor.
        let mut t = Transition::new("t");
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(0, 5), mult: 1 });
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(0, 5), mult: 1 });
        t.postset.push(OutputArc { place: PlaceIdx(1), mult: 2 });
        let net = Tapn::new(vec![place("p0"), place("p1")], vec![t]).unwrap();

        let mut m = Marking::new(2);
        m.add(PlaceIdx(0), token(0, 2));
        let succs = successors(&net, &m, TransIdx(0));
        assert_eq!(succs.len(), 1);
        assert_eq!(succs[0].count(PlaceIdx(0)), 0);
        assert_eq!(succs[0].tokens_in(PlaceIdx(1)), &[token(0, 2)]);
    }

    #[test]
    fn shared_pool_cannot_be_overconsumed() {
        // Two arcs, one token: both enable individually, never jointly.
        let mut t = Transition::new("t");
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(0, 5), mult: 1 });
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(0, 5), mult: 1 });
        let net = Tapn::new(vec![place("p0")], vec![t]).unwrap();

        let mut m = Marking::new(1);
        m.add(PlaceIdx(0), token(0, 1));
        assert!(successors(&net, &m, TransIdx(0)).is_empty());
    }

    #[test]
    fn distinct_ages_enumerate_the_product() {
        // One arc, multiplicity 2, tokens of ages {1, 2, 3}: C(3,2) = 3.
        let mut t = Transition::new("t");
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(0, 9), mult: 2 });
        t.postset.push(OutputArc { place: PlaceIdx(1), mult: 1 });
        let net = Tapn::new(vec![place("p0"), place("p1")], vec![t]).unwrap();

        let mut m = Marking::new(2);
        for age in [1, 2, 3] {
            m.add(PlaceIdx(0), token(age, 1));
        }
        let succs = successors(&net, &m, TransIdx(0));
        assert_eq!(succs.len(), 3);
        let leftovers: Vec<u32> =
            succs.iter().map(|s| s.tokens_in(PlaceIdx(0))[0].age).collect();
        assert_eq!(leftovers, vec![3, 2, 1]);
    }

    #[test]
    fn empty_preset_is_always_enabled_once() {
        let mut t = Transition::new("t");
        t.postset.push(OutputArc { place: PlaceIdx(0), mult: 1 });
        let net = Tapn::new(vec![place("p0")], vec![t]).unwrap();

        let m = Marking::new(1);
        assert!(is_enabled(&net, &m, TransIdx(0)));
        let succs = successors(&net, &m, TransIdx(0));
        assert_eq!(succs.len(), 1);
        assert_eq!(succs[0].tokens_in(PlaceIdx(0)), &[token(0, 1)]);
    }

    #[test]
    fn token_totals_balance_across_firing() {
        // Conservation: |M'| = |M| − in + out; transports are neutral.
        let mut t = Transition::new("t");
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(0, 9), mult: 2 });
        t.transports.push(TransportArc {
            source: PlaceIdx(1),
            dest: PlaceIdx(2),
            interval: interval(0, 9),
            mult: 1,
        });
        t.postset.push(OutputArc { place: PlaceIdx(2), mult: 3 });
        let net = Tapn::new(vec![place("p0"), place("p1"), place("p2")], vec![t]).unwrap();

        let mut m = Marking::new(3);
        m.add(PlaceIdx(0), token(0, 2));
        m.add(PlaceIdx(0), token(4, 1));
        m.add(PlaceIdx(1), token(7, 1));

        for s in successors(&net, &m, TransIdx(0)) {
            assert_eq!(s.total_count(), m.total_count() - 2 + 3);
        }
    }
}
