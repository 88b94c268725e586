//! Timed-arc Petri net description
//!
//! An immutable net: places with age invariants, transitions with their
//! four arc kinds (input, output, transport, inhibitor), urgency flags and
//! optional firing-time distributions for the stochastic engine.
//!
//! Arcs are owned by the transition they belong to, which is the shape the
//! successor generator consumes: enabling and firing are per-transition
//! traversals of its own arc lists, never global arc scans.
//!
//! Construction validates every cross-reference once, so the exploration
//! kernels can index places and transitions without bound checks beyond the
//! slice accesses themselves. `max_constant` (the largest finite bound in
//! any interval or invariant) is precomputed here; token ages beyond it are
//! behaviourally indistinguishable and the marking cut clamps to it.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::smc::FiringDistribution;

/// Index of a place `p ∈ {0..P-1}`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaceIdx(pub usize);
impl PlaceIdx {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Index of a transition `t ∈ {0..T-1}`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransIdx(pub usize);
impl TransIdx {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Errors surfaced while assembling a net.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("place index {index} out of range ({count} places)")]
    PlaceOutOfRange { index: usize, count: usize },
    #[error("arc multiplicity must be positive")]
    ZeroMultiplicity,
    #[error("inhibitor weight must be positive")]
    ZeroInhibitorWeight,
    #[error("empty time interval [{lo}, {hi}]")]
    EmptyInterval { lo: u32, hi: u32 },
    #[error("transition weight must be finite and non-negative (got {0})")]
    BadWeight(f64),
    #[error("invalid distribution parameter: {0}")]
    BadDistribution(&'static str),
}

/// Closed discrete time interval `[lo, hi]`; `hi = None` is right-open.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimeInterval {
    pub lo: u32,
    pub hi: Option<u32>,
}

impl TimeInterval {
    pub fn new(lo: u32, hi: Option<u32>) -> Result<Self, ModelError> {
        if let Some(h) = hi {
            if h < lo {
                return Err(ModelError::EmptyInterval { lo, hi: h });
            }
        }
        Ok(Self { lo, hi })
    }

    /// Unconstrained interval `[0, ∞)`.
    pub fn unbounded() -> Self {
        Self { lo: 0, hi: None }
    }

    #[inline]
    pub fn contains(&self, age: u32) -> bool {
        age >= self.lo && self.hi.map_or(true, |h| age <= h)
    }
}

/// Per-place upper bound on token ages.
///
/// Strict source bounds (`< k`) are normalised at construction: in discrete
/// time `< k` and `≤ k-1` coincide, so the stored form is always non-strict.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Invariant {
    Unbounded,
    AtMost(u32),
}

impl Invariant {
    pub fn from_bound(strict: bool, bound: u32) -> Self {
        if strict {
            Invariant::AtMost(bound.saturating_sub(1))
        } else {
            Invariant::AtMost(bound)
        }
    }

    #[inline]
    pub fn permits(&self, age: u32) -> bool {
        match *self {
            Invariant::Unbounded => true,
            Invariant::AtMost(b) => age <= b,
        }
    }

    #[inline]
    pub fn bound(&self) -> Option<u32> {
        match *self {
            Invariant::Unbounded => None,
            Invariant::AtMost(b) => Some(b),
        }
    }
}

/// Place classification. `Dead` marks peripheral sinks whose tokens can be
/// discarded during canonicalisation; the workflow analyser retypes them to
/// `Std` on its private clone of the net.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaceKind {
    Std,
    Dead,
}

#[derive(Clone, Debug)]
pub struct Place {
    pub name: String,
    pub invariant: Invariant,
    pub kind: PlaceKind,
}

impl Place {
    pub fn new(name: impl Into<String>, invariant: Invariant) -> Self {
        Self { name: name.into(), invariant, kind: PlaceKind::Std }
    }
}

/// Consumes `mult` tokens from `place` whose ages lie in `interval`.
#[derive(Clone, Debug)]
pub struct InputArc {
    pub place: PlaceIdx,
    pub interval: TimeInterval,
    pub mult: u32,
}

/// Produces `mult` tokens of age 0 in `place`.
#[derive(Clone, Debug)]
pub struct OutputArc {
    pub place: PlaceIdx,
    pub mult: u32,
}

/// Moves `mult` tokens from `source` to `dest`, ages preserved. The
/// destination invariant further restricts which tokens may travel.
#[derive(Clone, Debug)]
pub struct TransportArc {
    pub source: PlaceIdx,
    pub dest: PlaceIdx,
    pub interval: TimeInterval,
    pub mult: u32,
}

/// Disables the transition while `place` holds at least `weight` tokens.
#[derive(Clone, Debug)]
pub struct InhibitorArc {
    pub place: PlaceIdx,
    pub weight: u32,
}

#[derive(Clone, Debug)]
pub struct Transition {
    pub name: String,
    pub urgent: bool,
    /// Stochastic firing delay; `None` falls back to the constant-1 default
    /// during simulation. Urgent transitions always sample 0.
    pub distribution: Option<FiringDistribution>,
    /// Relative likelihood when several transitions tie on sampled delay.
    pub weight: f64,
    pub preset: Vec<InputArc>,
    pub postset: Vec<OutputArc>,
    pub transports: Vec<TransportArc>,
    pub inhibitors: Vec<InhibitorArc>,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            urgent: false,
            distribution: None,
            weight: 1.0,
            preset: Vec::new(),
            postset: Vec::new(),
            transports: Vec::new(),
            inhibitors: Vec::new(),
        }
    }

    /// Number of distinct consuming arcs (input + transport).
    #[inline]
    pub fn consuming_arcs(&self) -> usize {
        self.preset.len() + self.transports.len()
    }
}

/// A validated, immutable timed-arc Petri net.
#[derive(Clone, Debug)]
pub struct Tapn {
    places: Vec<Place>,
    transitions: Vec<Transition>,
    max_constant: u32,
    /// Per place: largest finite upper bound among consuming intervals
    /// leaving it, or `None` when some consuming interval is right-open
    /// (tokens there never age out of usefulness).
    max_useful_age: Vec<Option<u32>>,
}

impl Tapn {
    pub fn new(places: Vec<Place>, transitions: Vec<Transition>) -> Result<Self, ModelError> {
        let count = places.len();
        let check = |idx: PlaceIdx| -> Result<(), ModelError> {
            if idx.as_usize() >= count {
                return Err(ModelError::PlaceOutOfRange { index: idx.as_usize(), count });
            }
            Ok(())
        };

        let mut max_constant = 0u32;
        for place in &places {
            if let Invariant::AtMost(b) = place.invariant {
                max_constant = max_constant.max(b);
            }
        }
        let mut note = |interval: &TimeInterval| {
            max_constant = max_constant.max(interval.lo);
            if let Some(h) = interval.hi {
                max_constant = max_constant.max(h);
            }
        };

        // Tracks, per place, whether every consuming interval is bounded.
        let mut useful: Vec<Option<u32>> = vec![Some(0); count];
        let mut open: Vec<bool> = vec![false; count];
        let mut consume = |place: PlaceIdx, interval: &TimeInterval| match interval.hi {
            Some(h) => {
                if let Some(cur) = useful[place.as_usize()] {
                    useful[place.as_usize()] = Some(cur.max(h));
                }
            }
            None => open[place.as_usize()] = true,
        };

        for tr in &transitions {
            if !(tr.weight.is_finite() && tr.weight >= 0.0) {
                return Err(ModelError::BadWeight(tr.weight));
            }
            if let Some(dist) = &tr.distribution {
                dist.validate()?;
            }
            for arc in &tr.preset {
                check(arc.place)?;
                if arc.mult == 0 {
                    return Err(ModelError::ZeroMultiplicity);
                }
                note(&arc.interval);
                consume(arc.place, &arc.interval);
            }
            for arc in &tr.postset {
                check(arc.place)?;
                if arc.mult == 0 {
                    return Err(ModelError::ZeroMultiplicity);
                }
            }
            for arc in &tr.transports {
                check(arc.source)?;
                check(arc.dest)?;
                if arc.mult == 0 {
                    return Err(ModelError::ZeroMultiplicity);
                }
                note(&arc.interval);
                consume(arc.source, &arc.interval);
            }
            for arc in &tr.inhibitors {
                check(arc.place)?;
                if arc.weight == 0 {
                    return Err(ModelError::ZeroInhibitorWeight);
                }
            }
        }

        for (p, is_open) in open.iter().enumerate() {
            if *is_open {
                useful[p] = None;
            }
        }

        Ok(Self { places, transitions, max_constant, max_useful_age: useful })
    }

    #[inline]
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    #[inline]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    #[inline]
    pub fn num_places(&self) -> usize {
        self.places.len()
    }

    #[inline]
    pub fn num_transitions(&self) -> usize {
        self.transitions.len()
    }

    #[inline]
    pub fn place(&self, p: PlaceIdx) -> &Place {
        &self.places[p.as_usize()]
    }

    #[inline]
    pub fn transition(&self, t: TransIdx) -> &Transition {
        &self.transitions[t.as_usize()]
    }

    /// Largest finite constant in any interval or invariant.
    #[inline]
    pub fn max_constant(&self) -> u32 {
        self.max_constant
    }

    /// Largest age at which a token in `p` can still feed some arc, or
    /// `None` when a right-open interval consumes from `p`.
    #[inline]
    pub fn max_useful_age(&self, p: PlaceIdx) -> Option<u32> {
        self.max_useful_age[p.as_usize()]
    }

    /// Resolve a place by display name.
    pub fn place_by_name(&self, name: &str) -> Option<PlaceIdx> {
        self.places.iter().position(|p| p.name == name).map(PlaceIdx)
    }

    /// A copy of the net with every `Dead` place retyped to `Std`, used by
    /// the workflow analyser so left-behind tokens stay observable.
    pub fn with_dead_places_retyped(&self) -> Tapn {
        let mut clone = self.clone();
        for place in &mut clone.places {
            if place.kind == PlaceKind::Dead {
                place.kind = PlaceKind::Std;
            }
        }
        clone
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn one_place_net(invariant: Invariant) -> Tapn {
        Tapn::new(vec![Place::new("p0", invariant)], Vec::new()).unwrap()
    }

    #[test]
    fn interval_containment() {
        let i = TimeInterval::new(1, Some(3)).unwrap();
        assert!(!i.contains(0));
        assert!(i.contains(1));
        assert!(i.contains(3));
        assert!(!i.contains(4));

        let open = TimeInterval::new(2, None).unwrap();
        assert!(open.contains(u32::MAX));
        assert!(!open.contains(1));

        assert!(TimeInterval::new(4, Some(3)).is_err());
    }

    #[test]
    fn strict_invariant_normalises() {
        assert_eq!(Invariant::from_bound(true, 3), Invariant::AtMost(2));
        assert_eq!(Invariant::from_bound(false, 3), Invariant::AtMost(3));
        assert!(Invariant::AtMost(2).permits(2));
        assert!(!Invariant::AtMost(2).permits(3));
        assert!(Invariant::Unbounded.permits(u32::MAX));
    }

    #[test]
    fn builder_rejects_bad_references() {
        let mut t = Transition::new("t");
        t.preset.push(InputArc {
            place: PlaceIdx(1),
            interval: TimeInterval::unbounded(),
            mult: 1,
        });
        let err = Tapn::new(vec![Place::new("p0", Invariant::Unbounded)], vec![t]).unwrap_err();
        assert!(matches!(err, ModelError::PlaceOutOfRange { index: 1, count: 1 }));

        let mut t = Transition::new("t");
        t.postset.push(OutputArc { place: PlaceIdx(0), mult: 0 });
        let err = Tapn::new(vec![Place::new("p0", Invariant::Unbounded)], vec![t]).unwrap_err();
        assert!(matches!(err, ModelError::ZeroMultiplicity));
    }

    #[test]
    fn max_constant_covers_intervals_and_invariants() {
        let mut t = Transition::new("t");
        t.preset.push(InputArc {
            place: PlaceIdx(0),
            interval: TimeInterval::new(2, Some(7)).unwrap(),
            mult: 1,
        });
        let net = Tapn::new(
            vec![Place::new("p0", Invariant::AtMost(5)), Place::new("p1", Invariant::Unbounded)],
            vec![t],
        )
        .unwrap();
        assert_eq!(net.max_constant(), 7);

        let net = one_place_net(Invariant::AtMost(11));
        assert_eq!(net.max_constant(), 11);
    }

    #[test]
    fn useful_age_tracks_consuming_intervals() {
        let mut t = Transition::new("t");
        t.preset.push(InputArc {
            place: PlaceIdx(0),
            interval: TimeInterval::new(0, Some(4)).unwrap(),
            mult: 1,
        });
        t.transports.push(TransportArc {
            source: PlaceIdx(1),
            dest: PlaceIdx(0),
            interval: TimeInterval::new(0, None).unwrap(),
            mult: 1,
        });
        let net = Tapn::new(
            vec![Place::new("p0", Invariant::Unbounded), Place::new("p1", Invariant::Unbounded)],
            vec![t],
        )
        .unwrap();
        assert_eq!(net.max_useful_age(PlaceIdx(0)), Some(4));
        assert_eq!(net.max_useful_age(PlaceIdx(1)), None);
    }

    #[test]
    fn dead_place_retyping_clones() {
        let mut places = vec![Place::new("p0", Invariant::Unbounded)];
        places[0].kind = PlaceKind::Dead;
        let net = Tapn::new(places, Vec::new()).unwrap();
        let retyped = net.with_dead_places_retyped();
        assert_eq!(net.place(PlaceIdx(0)).kind, PlaceKind::Dead);
        assert_eq!(retyped.place(PlaceIdx(0)).kind, PlaceKind::Std);
    }
}
