//! Aged-token multisets
//!
//! A [`Marking`] holds, per place, an age-sorted run of tokens with equal
//! ages coalesced into a single `(age, count)` entry. That canonical shape
//! makes structural equality and hashing coincide with multiset equality,
//! which the passed set relies on: any insertion order over the same token
//! multiset produces the same bytes.
//!
//! Time passage is **pure**: [`Marking::delayed`] builds the advanced
//! marking or reports the violated invariant without touching the receiver,
//! so a failed delay can simply be dropped (and counted) by the kernel.
//!
//! [`Marking::cut`] clamps ages to `max_constant + 1` — ages beyond every
//! finite bound are behaviourally equivalent, and the clamp is what makes
//! the discrete state space finite. The same pass optionally sheds tokens
//! that can never again feed an arc (aged past every consuming interval of
//! their place, or sitting in a `Dead` place).

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::model::{PlaceIdx, PlaceKind, Tapn};

/// A run of same-aged tokens; `count ≥ 1` always.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    pub age: u32,
    pub count: u32,
}

/// Raised when advancing ages would break a place invariant. The marking
/// the delay was attempted on is left untouched.
#[derive(Debug, thiserror::Error)]
#[error("delay of {delay} violates the invariant of place {}", .place.as_usize())]
pub struct InvariantViolated {
    pub place: PlaceIdx,
    pub delay: u32,
}

/// Multiset of aged tokens per place, dense over the net's place indices.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Marking {
    places: Vec<Vec<Token>>,
}

impl Marking {
    pub fn new(num_places: usize) -> Self {
        Self { places: vec![Vec::new(); num_places] }
    }

    #[inline]
    pub fn num_places(&self) -> usize {
        self.places.len()
    }

    /// Tokens in `p`, age-sorted, equal ages coalesced.
    #[inline]
    pub fn tokens_in(&self, p: PlaceIdx) -> &[Token] {
        &self.places[p.as_usize()]
    }

    /// Number of tokens in `p`.
    pub fn count(&self, p: PlaceIdx) -> u32 {
        self.places[p.as_usize()].iter().map(|t| t.count).sum()
    }

    /// Number of tokens in the whole marking.
    pub fn total_count(&self) -> u32 {
        self.places.iter().flatten().map(|t| t.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.places.iter().all(|ts| ts.is_empty())
    }

    /// Add `token`, coalescing with an existing equal-age run.
    pub fn add(&mut self, p: PlaceIdx, token: Token) {
        debug_assert!(token.count > 0, "tokens carry at least one unit");
        let tokens = &mut self.places[p.as_usize()];
        match tokens.binary_search_by_key(&token.age, |t| t.age) {
            Ok(i) => tokens[i].count += token.count,
            Err(i) => tokens.insert(i, token),
        }
    }

    /// Remove `count` tokens of exactly `age` from `p`. Returns false (and
    /// removes nothing) when fewer than `count` such tokens are present.
    pub fn remove(&mut self, p: PlaceIdx, age: u32, count: u32) -> bool {
        let tokens = &mut self.places[p.as_usize()];
        match tokens.binary_search_by_key(&age, |t| t.age) {
            Ok(i) if tokens[i].count > count => {
                tokens[i].count -= count;
                true
            }
            Ok(i) if tokens[i].count == count => {
                tokens.remove(i);
                true
            }
            _ => false,
        }
    }

    /// The marking `dt` time units later, or the invariant that forbids it.
    ///
    /// Age overflow is treated as an invariant violation (it can only occur
    /// past every finite bound, where the cut would clamp anyway).
    pub fn delayed(&self, dt: u32, net: &Tapn) -> Result<Marking, InvariantViolated> {
        let mut out = self.clone();
        for (p, tokens) in out.places.iter_mut().enumerate() {
            let place = PlaceIdx(p);
            let invariant = net.place(place).invariant;
            for token in tokens.iter_mut() {
                let age = match token.age.checked_add(dt) {
                    Some(age) => age,
                    None => {
                        debug_assert!(false, "token age overflow in delay");
                        return Err(InvariantViolated { place, delay: dt });
                    }
                };
                if !invariant.permits(age) {
                    return Err(InvariantViolated { place, delay: dt });
                }
                token.age = age;
            }
        }
        Ok(out)
    }

    /// Canonicalise after a step: clamp ages to `max_constant + 1` and, for
    /// places where `shed` permits it, drop tokens that can never again feed
    /// an arc. Coalesces the clamped runs.
    ///
    /// `shed` must exclude every place the active query observes — dropping
    /// tokens changes place counts, and only unobserved places may do so.
    pub fn cut(&mut self, net: &Tapn, shed: Option<&[bool]>) {
        let ceiling = net.max_constant().saturating_add(1);
        for (p, tokens) in self.places.iter_mut().enumerate() {
            let place = PlaceIdx(p);
            // Tokens under a finite invariant eventually block time
            // passage, so they are behaviourally alive no matter how old.
            let unbounded = net.place(place).invariant.bound().is_none();
            if unbounded && shed.map_or(false, |s| s[p]) {
                match net.place(place).kind {
                    PlaceKind::Dead => {
                        tokens.clear();
                        continue;
                    }
                    PlaceKind::Std => {}
                }
                if let Some(limit) = net.max_useful_age(place) {
                    tokens.retain(|t| t.age <= limit);
                }
            }
            // Clamp and re-coalesce the (age-sorted) tail.
            let mut clamped: Option<usize> = None;
            for (i, token) in tokens.iter_mut().enumerate() {
                if token.age > ceiling {
                    token.age = ceiling;
                    if clamped.is_none() {
                        clamped = Some(i);
                    }
                }
            }
            if let Some(first) = clamped {
                let merged: u32 = tokens[first..].iter().map(|t| t.count).sum();
                let start = if first > 0 && tokens[first - 1].age == ceiling { first - 1 } else { first };
                let merged = if start < first { merged + tokens[start].count } else { merged };
                tokens.truncate(start);
                tokens.push(Token { age: ceiling, count: merged });
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Invariant, Place, Tapn};
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn net(invariants: &[Invariant]) -> Tapn {
        let places = invariants
            .iter()
            .enumerate()
            .map(|(i, inv)| Place::new(format!("p{i}"), *inv))
            .collect();
        Tapn::new(places, Vec::new()).unwrap()
    }

    fn digest(m: &Marking) -> u64 {
        let mut h = DefaultHasher::new();
        m.hash(&mut h);
        h.finish()
    }

    #[test]
    fn add_keeps_sorted_coalesced_runs() {
        let mut m = Marking::new(1);
        m.add(PlaceIdx(0), Token { age: 3, count: 1 });
        m.add(PlaceIdx(0), Token { age: 1, count: 2 });
        m.add(PlaceIdx(0), Token { age: 3, count: 4 });
        assert_eq!(
            m.tokens_in(PlaceIdx(0)),
            &[Token { age: 1, count: 2 }, Token { age: 3, count: 5 }]
        );
        assert_eq!(m.count(PlaceIdx(0)), 7);
    }

    #[test]
    fn insertion_order_is_canonical() {
        let mut a = Marking::new(2);
        a.add(PlaceIdx(0), Token { age: 0, count: 1 });
        a.add(PlaceIdx(0), Token { age: 2, count: 1 });
        a.add(PlaceIdx(1), Token { age: 5, count: 3 });

        let mut b = Marking::new(2);
        b.add(PlaceIdx(1), Token { age: 5, count: 2 });
        b.add(PlaceIdx(0), Token { age: 2, count: 1 });
        b.add(PlaceIdx(1), Token { age: 5, count: 1 });
        b.add(PlaceIdx(0), Token { age: 0, count: 1 });

        assert_eq!(a, b);
        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn remove_takes_exact_age_runs() {
        let mut m = Marking::new(1);
        m.add(PlaceIdx(0), Token { age: 2, count: 3 });
        assert!(m.remove(PlaceIdx(0), 2, 2));
        assert_eq!(m.tokens_in(PlaceIdx(0)), &[Token { age: 2, count: 1 }]);
        assert!(m.remove(PlaceIdx(0), 2, 1));
        assert!(m.tokens_in(PlaceIdx(0)).is_empty());
        assert!(!m.remove(PlaceIdx(0), 2, 1));
        assert!(!m.remove(PlaceIdx(0), 9, 1));
    }

    #[test]
    fn delay_respects_invariants_and_is_pure() {
        let net = net(&[Invariant::AtMost(2), Invariant::Unbounded]);
        let mut m = Marking::new(2);
        m.add(PlaceIdx(0), Token { age: 1, count: 1 });
        m.add(PlaceIdx(1), Token { age: 9, count: 1 });

        let before = m.clone();
        let advanced = m.delayed(1, &net).unwrap();
        assert_eq!(advanced.tokens_in(PlaceIdx(0)), &[Token { age: 2, count: 1 }]);
        assert_eq!(advanced.tokens_in(PlaceIdx(1)), &[Token { age: 10, count: 1 }]);

        let err = m.delayed(2, &net).unwrap_err();
        assert_eq!(err.place, PlaceIdx(0));
        assert_eq!(m, before);
    }

    #[test]
    fn cut_clamps_and_merges_old_runs() {
        // max_constant = 2 via the invariant, ceiling = 3.
        let net = net(&[Invariant::Unbounded, Invariant::AtMost(2)]);
        let mut m = Marking::new(2);
        m.add(PlaceIdx(0), Token { age: 3, count: 1 });
        m.add(PlaceIdx(0), Token { age: 4, count: 2 });
        m.add(PlaceIdx(0), Token { age: 9, count: 1 });
        m.cut(&net, None);
        assert_eq!(m.tokens_in(PlaceIdx(0)), &[Token { age: 3, count: 4 }]);
    }

    #[test]
    fn cut_sheds_tokens_past_every_consuming_interval() {
        use crate::model::{InputArc, TimeInterval, Transition};
        let mut t = Transition::new("t");
        t.preset.push(InputArc {
            place: PlaceIdx(0),
            interval: TimeInterval::new(0, Some(2)).unwrap(),
            mult: 1,
        });
        let net = Tapn::new(vec![Place::new("p0", Invariant::Unbounded)], vec![t]).unwrap();

        let mut m = Marking::new(1);
        m.add(PlaceIdx(0), Token { age: 1, count: 1 });
        m.add(PlaceIdx(0), Token { age: 3, count: 5 });

        let mut kept = m.clone();
        kept.cut(&net, None);
        assert_eq!(kept.count(PlaceIdx(0)), 6);

        m.cut(&net, Some(&[true]));
        assert_eq!(m.tokens_in(PlaceIdx(0)), &[Token { age: 1, count: 1 }]);
    }
}
