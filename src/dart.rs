//! Time-dart generation
//!
//! A dart compresses the time dimension: instead of storing every unit
//! delay of a marking, a single *base* marking represents the whole family
//! `{base + w | 0 ≤ w ≤ waiting}` that invariants permit. Exploration then
//! only needs the delays at which the enabled-transition set actually
//! changes — between two boundaries every delay fires the same transitions
//! over the same (age-shifted) enabling sets, and atomic propositions read
//! place counts, which delays never change.
//!
//! `waiting` is additionally capped at `max_constant + 1`: past every
//! finite constant, further aging is invisible to intervals and invariants
//! alike (the marking cut clamps there for the same reason).
//!
//! Urgency truncates the scan: once an urgent transition is enabled at some
//! boundary, no later delay may be taken, so the scan stops after firing
//! that boundary.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::marking::Marking;
use crate::model::{Invariant, PlaceIdx, Tapn, TransIdx};
use crate::successor::{enabled_vector, successors};

/// One firing discovered while scanning a dart's delay range.
#[derive(Clone, Debug)]
pub struct DartFiring {
    pub delay: u32,
    pub transition: TransIdx,
    pub marking: Marking,
}

/// The compressed family rooted at one base marking: the permitted delay
/// range and every firing at an enabledness boundary within it.
#[derive(Clone, Debug)]
pub struct TimeDart {
    /// Maximal delay representable from the base (invariant- and
    /// constant-capped); delays were scanned in `0..=waiting` unless an
    /// urgent boundary cut the range short.
    pub waiting: u32,
    pub firings: Vec<DartFiring>,
}

/// Largest delay the invariants allow from `marking`, capped at
/// `max_constant + 1`.
pub fn max_delay(net: &Tapn, marking: &Marking) -> u32 {
    let mut limit = net.max_constant().saturating_add(1);
    for p in 0..net.num_places() {
        if let Invariant::AtMost(bound) = net.place(PlaceIdx(p)).invariant {
            // Token lists are age-sorted; the last run is the oldest.
            if let Some(oldest) = marking.tokens_in(PlaceIdx(p)).last() {
                debug_assert!(oldest.age <= bound, "marking violates an invariant");
                limit = limit.min(bound - oldest.age);
            }
        }
    }
    limit
}

/// Generate the dart rooted at `base`.
pub fn generate(net: &Tapn, base: &Marking) -> TimeDart {
    let horizon = max_delay(net, base);
    let mut firings = Vec::new();
    let mut prev: Option<Vec<bool>> = None;

    for w in 0..=horizon {
        let shifted = if w == 0 {
            base.clone()
        } else {
            match base.delayed(w, net) {
                Ok(m) => m,
                // Unreachable under `horizon`, but a dropped tail is the
                // safe reading if an invariant disagrees.
                Err(_) => return TimeDart { waiting: w.saturating_sub(1), firings },
            }
        };
        let enabled = enabled_vector(net, &shifted);
        let boundary = prev.as_ref() != Some(&enabled);
        if boundary {
            let mut urgent_here = false;
            for (i, on) in enabled.iter().enumerate() {
                if !on {
                    continue;
                }
                let t = TransIdx(i);
                if net.transition(t).urgent {
                    urgent_here = true;
                }
                for marking in successors(net, &shifted, t) {
                    firings.push(DartFiring { delay: w, transition: t, marking });
                }
            }
            if urgent_here {
                return TimeDart { waiting: w, firings };
            }
        }
        prev = Some(enabled);
    }

    TimeDart { waiting: horizon, firings }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marking::Token;
    use crate::model::{InputArc, Invariant, OutputArc, Place, TimeInterval, Transition};

    fn interval(lo: u32, hi: u32) -> TimeInterval {
        TimeInterval::new(lo, Some(hi)).unwrap()
    }

    #[test]
    fn delay_cap_follows_tightest_invariant() {
        let net = Tapn::new(
            vec![
                Place::new("p0", Invariant::AtMost(5)),
                Place::new("p1", Invariant::AtMost(9)),
            ],
            Vec::new(),
        )
        .unwrap();
        let mut m = Marking::new(2);
        m.add(PlaceIdx(0), Token { age: 3, count: 1 });
        m.add(PlaceIdx(1), Token { age: 2, count: 1 });
        assert_eq!(max_delay(&net, &m), 2);

        // Empty marking: only the constant cap applies.
        let empty = Marking::new(2);
        assert_eq!(max_delay(&net, &empty), 10);
    }

    #[test]
    fn boundaries_fire_once_per_enabledness_change() {
        // p0 --[2,3]--> t --> p1; token at age 0. The enabled set changes
        // at w = 2 (on) and stays equal through w = 3, so the dart carries
        // exactly the firings of the w = 2 and w = 3 shifts... the set is
        // *equal* at 3, hence only w = 2 fires.
        let mut t = Transition::new("t");
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(2, 3), mult: 1 });
        t.postset.push(OutputArc { place: PlaceIdx(1), mult: 1 });
        let net = Tapn::new(
            vec![Place::new("p0", Invariant::Unbounded), Place::new("p1", Invariant::Unbounded)],
            vec![t],
        )
        .unwrap();

        let mut m = Marking::new(2);
        m.add(PlaceIdx(0), Token { age: 0, count: 1 });

        let dart = generate(&net, &m);
        assert_eq!(dart.waiting, 4); // max_constant 3, cap 4
        assert_eq!(dart.firings.len(), 1);
        assert_eq!(dart.firings[0].delay, 2);
        assert_eq!(dart.firings[0].transition, TransIdx(0));
        assert_eq!(dart.firings[0].marking.count(PlaceIdx(1)), 1);
    }

    #[test]
    fn urgent_boundary_truncates_the_scan() {
        // u enables at w = 1 and is urgent; v would enable at w = 3 but the
        // scan must stop at the urgent boundary.
        let mut u = Transition::new("u");
        u.urgent = true;
        u.preset.push(InputArc { place: PlaceIdx(0), interval: interval(1, 5), mult: 1 });
        let mut v = Transition::new("v");
        v.preset.push(InputArc { place: PlaceIdx(0), interval: interval(3, 5), mult: 1 });
        let net = Tapn::new(vec![Place::new("p0", Invariant::Unbounded)], vec![u, v]).unwrap();

        let mut m = Marking::new(1);
        m.add(PlaceIdx(0), Token { age: 0, count: 1 });

        let dart = generate(&net, &m);
        assert_eq!(dart.waiting, 1);
        assert!(dart.firings.iter().all(|f| f.delay <= 1));
        assert!(dart.firings.iter().all(|f| f.transition == TransIdx(0)));
    }

    #[test]
    fn invariant_bound_ends_the_dart() {
        // Invariant ≤ 2 on p0: no delay past 2 exists at all.
        let mut t = Transition::new("t");
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(4, 6), mult: 1 });
        let net = Tapn::new(vec![Place::new("p0", Invariant::AtMost(2))], vec![t]).unwrap();

        let mut m = Marking::new(1);
        m.add(PlaceIdx(0), Token { age: 0, count: 1 });

        let dart = generate(&net, &m);
        assert_eq!(dart.waiting, 2);
        assert!(dart.firings.is_empty());
    }
}
