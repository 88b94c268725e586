//! Statistical model checking
//!
//! ## Runs
//! A run simulates the net under the transitions' firing-time
//! distributions. Ages are real-valued here — a non-discrete distribution
//! produces fractional delays — so runs operate on a private token list of
//! `f64` ages that mirrors the discrete generator's enabling, transport and
//! inhibitor rules. The integer engine is untouched.
//!
//! Each step samples a candidate delay per enabled transition (urgent ⇒ 0),
//! lets the smallest delay win with a weighted draw among exact ties,
//! advances time, re-checks the winner (aging past its interval re-samples
//! the step), and fires it, drawing consumed tokens uniformly without
//! replacement from the enabling sets. A run ends at the time bound, the
//! step bound, a dead marking, or as soon as the formula is decided.
//!
//! ## Decisions
//! - **SPRT** for `P(φ) ≥ p`: indifference region `[p−δ⁻, p+δ⁺]`, the
//!   log-likelihood ratio walks until it crosses `ln((1−β)/α)` (accept H₁,
//!   the probability is below `p`) or `ln(β/(1−α))` (accept H₀).
//! - **Estimation** for `P(φ) = ?`: a Chernoff–Hoeffding run count for the
//!   requested confidence and interval width, reporting the sample mean.
//!
//! Each run owns a PRNG seeded from the master stream, so a master seed
//! reproduces the whole experiment and runs stay independent of each other.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as _, Exp, Gamma, Normal, Uniform};
use tracing::debug;

use crate::marking::Marking;
use crate::model::{ModelError, PlaceIdx, Tapn, TransIdx, Transition};
use crate::query::{eval_with, Expr, Quantifier, Query, QueryError};
use crate::StopReason;

// ============================================================================
// Firing-time distributions
// ============================================================================

/// Supported delay laws. Parameters are validated at net construction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Law {
    Constant(f64),
    Uniform(f64, f64),
    Exponential(f64),
    Normal(f64, f64),
    Gamma(f64, f64),
}

/// A delay law plus the discretisation flag: discrete distributions round
/// every sample to the nearest integer. All samples clamp at zero.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FiringDistribution {
    pub law: Law,
    pub discrete: bool,
}

impl FiringDistribution {
    pub fn constant(value: f64) -> Self {
        Self { law: Law::Constant(value), discrete: false }
    }

    /// An urgent transition fires the moment it is enabled.
    pub fn urgent() -> Self {
        Self::constant(0.0)
    }

    /// Fallback for transitions with no declared distribution.
    pub fn default_firing() -> Self {
        Self::constant(1.0)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let ok = match self.law {
            Law::Constant(v) => v.is_finite() && v >= 0.0,
            Law::Uniform(a, b) => a.is_finite() && b.is_finite() && a <= b,
            Law::Exponential(rate) => rate.is_finite() && rate > 0.0,
            Law::Normal(mean, stddev) => mean.is_finite() && stddev.is_finite() && stddev > 0.0,
            Law::Gamma(shape, scale) => {
                shape.is_finite() && shape > 0.0 && scale.is_finite() && scale > 0.0
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ModelError::BadDistribution(match self.law {
                Law::Constant(_) => "constant value must be finite and non-negative",
                Law::Uniform(..) => "uniform bounds must be finite with a <= b",
                Law::Exponential(_) => "exponential rate must be positive",
                Law::Normal(..) => "normal deviation must be positive",
                Law::Gamma(..) => "gamma shape and scale must be positive",
            }))
        }
    }

    /// Draw one delay. Parameters were validated up front, so constructor
    /// failures cannot occur; the zero fallback only guards the type.
    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        let raw = match self.law {
            Law::Constant(v) => v,
            Law::Uniform(a, b) => Uniform::new_inclusive(a, b).sample(rng),
            Law::Exponential(rate) => Exp::new(rate).map(|d| d.sample(rng)).unwrap_or(0.0),
            Law::Normal(mean, stddev) => {
                Normal::new(mean, stddev).map(|d| d.sample(rng)).unwrap_or(0.0)
            }
            Law::Gamma(shape, scale) => {
                Gamma::new(shape, scale).map(|d| d.sample(rng)).unwrap_or(0.0)
            }
        };
        let rounded = if self.discrete { raw.round() } else { raw };
        rounded.max(0.0)
    }
}

/// Effective distribution of a transition during simulation.
fn firing_law(tr: &Transition) -> FiringDistribution {
    if tr.urgent {
        FiringDistribution::urgent()
    } else {
        tr.distribution.unwrap_or_else(FiringDistribution::default_firing)
    }
}

// ============================================================================
// Settings and outcomes
// ============================================================================

/// Knobs of the statistical engine; field meanings follow the engine's
/// option surface one to one.
#[derive(Copy, Clone, Debug)]
pub struct SmcSettings {
    /// Model-time horizon of a single run.
    pub time_bound: f64,
    /// Firing-count horizon of a single run.
    pub step_bound: u64,
    /// SPRT α: probability of accepting H₁ although H₀ holds.
    pub false_positives: f64,
    /// SPRT β: probability of accepting H₀ although H₁ holds.
    pub false_negatives: f64,
    /// Indifference-region width above the threshold.
    pub indifference_up: f64,
    /// Indifference-region width below the threshold.
    pub indifference_down: f64,
    /// Estimation confidence level.
    pub confidence: f64,
    /// Requested estimation interval width.
    pub estimation_interval_width: f64,
    /// `true` runs the SPRT against `geq_than`; `false` estimates.
    pub compare_to_float: bool,
    /// Threshold of the hypothesis `P(φ) ≥ geq_than`.
    pub geq_than: f64,
}

impl Default for SmcSettings {
    fn default() -> Self {
        Self {
            time_bound: 1000.0,
            step_bound: 10_000,
            false_positives: 0.05,
            false_negatives: 0.05,
            indifference_up: 0.05,
            indifference_down: 0.05,
            confidence: 0.95,
            estimation_interval_width: 0.1,
            compare_to_float: false,
            geq_than: 0.5,
        }
    }
}

/// What the statistical engine concluded.
#[derive(Clone, Debug, PartialEq)]
pub enum SmcResult {
    /// SPRT verdict on `P(φ) ≥ geq_than`.
    Accepted { holds: bool },
    /// Estimated probability with the requested-width interval around it.
    Estimate { mean: f64, low: f64, high: f64 },
    Interrupted(StopReason),
}

#[derive(Clone, Debug)]
pub struct SmcOutcome {
    pub result: SmcResult,
    pub runs: u64,
    pub satisfied: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SmcError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("statistical runs decide EF and AG formulas only (got {0:?})")]
    UnsupportedQuantifier(Quantifier),
}

// ============================================================================
// Real-aged marking
// ============================================================================

/// Simulation marking: individual token ages per place, kept sorted.
struct RealMarking {
    places: Vec<Vec<f64>>,
}

impl RealMarking {
    fn from_marking(m: &Marking) -> Self {
        let places = (0..m.num_places())
            .map(|p| {
                let mut ages = Vec::new();
                for t in m.tokens_in(PlaceIdx(p)) {
                    for _ in 0..t.count {
                        ages.push(t.age as f64);
                    }
                }
                ages
            })
            .collect();
        Self { places }
    }

    #[inline]
    fn count(&self, p: PlaceIdx) -> u32 {
        self.places[p.as_usize()].len() as u32
    }

    fn advance(&mut self, dt: f64) {
        for ages in &mut self.places {
            for age in ages.iter_mut() {
                *age += dt;
            }
        }
    }

    /// Largest delay every invariant tolerates; infinite when unbound.
    fn max_allowed_delay(&self, net: &Tapn) -> f64 {
        let mut allowed = f64::INFINITY;
        for (p, ages) in self.places.iter().enumerate() {
            if let Some(bound) = net.place(PlaceIdx(p)).invariant.bound() {
                for &age in ages {
                    allowed = allowed.min(bound as f64 - age);
                }
            }
        }
        allowed
    }

    /// Indices of tokens in `place` whose age fits `interval` (and, for
    /// transports, the destination invariant).
    fn enabling(
        &self,
        net: &Tapn,
        place: PlaceIdx,
        lo: f64,
        hi: Option<f64>,
        dest: Option<PlaceIdx>,
    ) -> Vec<usize> {
        let bound = dest.and_then(|d| net.place(d).invariant.bound()).map(|b| b as f64);
        self.places[place.as_usize()]
            .iter()
            .enumerate()
            .filter(|(_, &age)| {
                age >= lo
                    && hi.map_or(true, |h| age <= h)
                    && bound.map_or(true, |b| age <= b)
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn is_enabled(&self, net: &Tapn, t: TransIdx) -> bool {
        let tr = net.transition(t);
        if tr.inhibitors.iter().any(|arc| self.count(arc.place) >= arc.weight) {
            return false;
        }
        for arc in &tr.preset {
            let fits =
                self.enabling(net, arc.place, arc.interval.lo as f64, arc.interval.hi.map(f64::from), None);
            if (fits.len() as u32) < arc.mult {
                return false;
            }
        }
        for arc in &tr.transports {
            let fits = self.enabling(
                net,
                arc.source,
                arc.interval.lo as f64,
                arc.interval.hi.map(f64::from),
                Some(arc.dest),
            );
            if (fits.len() as u32) < arc.mult {
                return false;
            }
        }
        true
    }

    /// Fire `t`, drawing consumed tokens uniformly without replacement.
    /// The caller has checked enabledness.
    fn fire(&mut self, net: &Tapn, t: TransIdx, rng: &mut StdRng) {
        let tr = net.transition(t);
        // (place, indices to drop) per consuming arc; transports also move.
        for arc in &tr.preset {
            let fits =
                self.enabling(net, arc.place, arc.interval.lo as f64, arc.interval.hi.map(f64::from), None);
            let picks = rand::seq::index::sample(rng, fits.len(), arc.mult as usize);
            let mut drop: Vec<usize> = picks.iter().map(|i| fits[i]).collect();
            drop.sort_unstable_by(|a, b| b.cmp(a));
            for ix in drop {
                self.places[arc.place.as_usize()].swap_remove(ix);
            }
        }
        for arc in &tr.transports {
            let fits = self.enabling(
                net,
                arc.source,
                arc.interval.lo as f64,
                arc.interval.hi.map(f64::from),
                Some(arc.dest),
            );
            let picks = rand::seq::index::sample(rng, fits.len(), arc.mult as usize);
            let mut drop: Vec<usize> = picks.iter().map(|i| fits[i]).collect();
            drop.sort_unstable_by(|a, b| b.cmp(a));
            for ix in drop {
                let age = self.places[arc.source.as_usize()].swap_remove(ix);
                self.places[arc.dest.as_usize()].push(age);
            }
        }
        for arc in &tr.postset {
            for _ in 0..arc.mult {
                self.places[arc.place.as_usize()].push(0.0);
            }
        }
    }
}

// ============================================================================
// Single run
// ============================================================================

struct RunRecord {
    satisfied: bool,
}

fn simulate_run(
    net: &Tapn,
    initial: &Marking,
    body: &Expr,
    quantifier: Quantifier,
    settings: &SmcSettings,
    rng: &mut StdRng,
) -> RunRecord {
    // EF: satisfied the moment the body holds; AG: satisfied iff the body
    // held at every observation until the run ended.
    let ef = matches!(quantifier, Quantifier::Ef);
    let mut marking = RealMarking::from_marking(initial);
    let mut time = 0.0f64;
    let mut steps = 0u64;

    loop {
        let holds = eval_with(body, &|p| marking.count(p));
        if ef && holds {
            return RunRecord { satisfied: true };
        }
        if !ef && !holds {
            return RunRecord { satisfied: false };
        }
        if steps >= settings.step_bound || time >= settings.time_bound {
            return RunRecord { satisfied: !ef };
        }

        let enabled: Vec<TransIdx> = (0..net.num_transitions())
            .map(TransIdx)
            .filter(|&t| marking.is_enabled(net, t))
            .collect();
        if enabled.is_empty() {
            // Dead marking; the run is over.
            return RunRecord { satisfied: !ef };
        }

        let delays: Vec<f64> =
            enabled.iter().map(|&t| firing_law(net.transition(t)).sample(rng)).collect();
        let min_delay = delays.iter().copied().fold(f64::INFINITY, f64::min);

        // Weighted draw among the transitions tying on the minimal delay.
        let ties: Vec<usize> =
            (0..enabled.len()).filter(|&i| delays[i] == min_delay).collect();
        let winner = if ties.len() == 1 {
            enabled[ties[0]]
        } else {
            let total: f64 = ties.iter().map(|&i| net.transition(enabled[i]).weight).sum();
            let mut ball = if total > 0.0 { rng.gen_range(0.0..total) } else { 0.0 };
            let mut pick = ties[0];
            if total > 0.0 {
                for &i in &ties {
                    let w = net.transition(enabled[i]).weight;
                    if ball < w {
                        pick = i;
                        break;
                    }
                    ball -= w;
                }
            }
            enabled[pick]
        };

        // An invariant that cannot accommodate the winning delay kills the
        // run: no lesser delay fires anything either.
        if min_delay > marking.max_allowed_delay(net) {
            return RunRecord { satisfied: !ef };
        }
        if time + min_delay > settings.time_bound {
            return RunRecord { satisfied: !ef };
        }

        marking.advance(min_delay);
        time += min_delay;

        // Aging may have pushed the winner out of its intervals; if so the
        // step re-samples at the new ages.
        if marking.is_enabled(net, winner) {
            marking.fire(net, winner, rng);
            steps += 1;
        }
    }
}

// ============================================================================
// Decision procedures
// ============================================================================

/// Run the statistical engine: SPRT when `compare_to_float`, estimation
/// otherwise.
pub fn verify(
    net: &Tapn,
    initial: &Marking,
    query: &Query,
    settings: &SmcSettings,
    seed: u64,
    cancel: &crate::CancelToken,
) -> Result<SmcOutcome, SmcError> {
    query.check(net)?;
    if !matches!(query.quantifier, Quantifier::Ef | Quantifier::Ag) {
        return Err(SmcError::UnsupportedQuantifier(query.quantifier));
    }
    let out = if settings.compare_to_float {
        hypothesis(net, initial, query, settings, seed, cancel)
    } else {
        estimate(net, initial, query, settings, seed, cancel)
    };
    Ok(out)
}

fn hypothesis(
    net: &Tapn,
    initial: &Marking,
    query: &Query,
    settings: &SmcSettings,
    seed: u64,
    cancel: &crate::CancelToken,
) -> SmcOutcome {
    // H₀: p ≥ p₀ = θ + δ⁺; H₁: p ≤ p₁ = θ − δ⁻.
    let p0 = (settings.geq_than + settings.indifference_up).min(1.0);
    let p1 = (settings.geq_than - settings.indifference_down).max(0.0);
    let accept_h1 = ((1.0 - settings.false_negatives) / settings.false_positives).ln();
    let accept_h0 = (settings.false_negatives / (1.0 - settings.false_positives)).ln();

    let mut master = StdRng::seed_from_u64(seed);
    let mut llr = 0.0f64;
    let mut runs = 0u64;
    let mut satisfied = 0u64;

    loop {
        if cancel.is_cancelled() {
            return SmcOutcome {
                result: SmcResult::Interrupted(StopReason::Cancelled),
                runs,
                satisfied,
            };
        }
        let mut rng = StdRng::seed_from_u64(master.gen());
        let record = simulate_run(net, initial, &query.body, query.quantifier, settings, &mut rng);
        runs += 1;
        if record.satisfied {
            satisfied += 1;
            llr += (p1 / p0).ln();
        } else {
            llr += ((1.0 - p1) / (1.0 - p0)).ln();
        }

        if llr >= accept_h1 {
            debug!(runs, "SPRT accepted H1");
            return SmcOutcome { result: SmcResult::Accepted { holds: false }, runs, satisfied };
        }
        if llr <= accept_h0 {
            debug!(runs, "SPRT accepted H0");
            return SmcOutcome { result: SmcResult::Accepted { holds: true }, runs, satisfied };
        }
    }
}

/// Chernoff–Hoeffding bound: enough runs that the sample mean sits within
/// `width / 2` of the true probability with the requested confidence.
fn chernoff_runs(confidence: f64, width: f64) -> u64 {
    let half = (width / 2.0).max(f64::EPSILON);
    let runs = (2.0 / (1.0 - confidence)).ln() / (2.0 * half * half);
    runs.ceil().max(1.0) as u64
}

fn estimate(
    net: &Tapn,
    initial: &Marking,
    query: &Query,
    settings: &SmcSettings,
    seed: u64,
    cancel: &crate::CancelToken,
) -> SmcOutcome {
    let needed = chernoff_runs(settings.confidence, settings.estimation_interval_width);
    let mut master = StdRng::seed_from_u64(seed);
    let mut runs = 0u64;
    let mut satisfied = 0u64;

    while runs < needed {
        if cancel.is_cancelled() {
            return SmcOutcome {
                result: SmcResult::Interrupted(StopReason::Cancelled),
                runs,
                satisfied,
            };
        }
        let mut rng = StdRng::seed_from_u64(master.gen());
        let record = simulate_run(net, initial, &query.body, query.quantifier, settings, &mut rng);
        runs += 1;
        if record.satisfied {
            satisfied += 1;
        }
    }

    let mean = satisfied as f64 / runs as f64;
    let half = settings.estimation_interval_width / 2.0;
    debug!(runs, mean, "estimation finished");
    SmcOutcome {
        result: SmcResult::Estimate {
            mean,
            low: (mean - half).max(0.0),
            high: (mean + half).min(1.0),
        },
        runs,
        satisfied,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marking::Token;
    use crate::model::{InputArc, Invariant, OutputArc, Place, TimeInterval};
    use crate::query::parse;
    use crate::CancelToken;

    fn interval(lo: u32, hi: u32) -> TimeInterval {
        TimeInterval::new(lo, Some(hi)).unwrap()
    }

    /// Self-loop: one token cycles through t forever; t also counts its
    /// firings into `ticks`.
    fn ticking_net(law: Law) -> (Tapn, Marking) {
        let mut t = Transition::new("t");
        t.distribution = Some(FiringDistribution { law, discrete: false });
        t.preset.push(InputArc {
            place: PlaceIdx(0),
            interval: TimeInterval::unbounded(),
            mult: 1,
        });
        t.postset.push(OutputArc { place: PlaceIdx(0), mult: 1 });
        t.postset.push(OutputArc { place: PlaceIdx(1), mult: 1 });
        let net = Tapn::new(
            vec![
                Place::new("loop", Invariant::Unbounded),
                Place::new("ticks", Invariant::Unbounded),
            ],
            vec![t],
        )
        .unwrap();
        let mut m = Marking::new(2);
        m.add(PlaceIdx(0), Token { age: 0, count: 1 });
        (net, m)
    }

    #[test]
    fn distributions_clamp_and_round() {
        let mut rng = StdRng::seed_from_u64(1);
        // A negative-mean normal clamps to zero almost always.
        let d = FiringDistribution { law: Law::Normal(-5.0, 0.5), discrete: false };
        for _ in 0..64 {
            assert!(d.sample(&mut rng) >= 0.0);
        }
        let d = FiringDistribution { law: Law::Uniform(0.2, 0.8), discrete: true };
        for _ in 0..64 {
            let s = d.sample(&mut rng);
            assert!(s == 0.0 || s == 1.0);
        }
        assert_eq!(FiringDistribution::urgent().sample(&mut rng), 0.0);
        assert_eq!(FiringDistribution::default_firing().sample(&mut rng), 1.0);
    }

    #[test]
    fn distribution_validation_rejects_bad_parameters() {
        assert!(FiringDistribution { law: Law::Exponential(0.0), discrete: false }
            .validate()
            .is_err());
        assert!(FiringDistribution { law: Law::Uniform(2.0, 1.0), discrete: false }
            .validate()
            .is_err());
        assert!(FiringDistribution { law: Law::Gamma(1.0, 0.0), discrete: false }
            .validate()
            .is_err());
        assert!(FiringDistribution { law: Law::Normal(0.0, 1.0), discrete: false }
            .validate()
            .is_ok());
    }

    #[test]
    fn deterministic_net_estimates_exactly() {
        // Constant(1) delays: after time 5 the loop has ticked 5 times, so
        // "EF ticks >= 3" holds on every run and the mean is exactly 1.
        let (net, m0) = ticking_net(Law::Constant(1.0));
        let q = parse("EF ticks >= 3", &net).unwrap();
        let settings = SmcSettings {
            time_bound: 5.0,
            step_bound: 100,
            estimation_interval_width: 0.2,
            ..SmcSettings::default()
        };
        let out = verify(&net, &m0, &q, &settings, 7, &CancelToken::new()).unwrap();
        match out.result {
            SmcResult::Estimate { mean, low, high } => {
                assert_eq!(mean, 1.0);
                assert!(low <= 1.0 && (high - 1.0).abs() < 1e-9);
            }
            other => panic!("expected an estimate, got {other:?}"),
        }
        assert_eq!(out.satisfied, out.runs);
    }

    #[test]
    fn estimation_is_seed_reproducible() {
        // S5 shape: exponential(1) self-loop, bounded reachability of a
        // step count within a time bound.
        let (net, m0) = ticking_net(Law::Exponential(1.0));
        let q = parse("EF ticks >= 10", &net).unwrap();
        let settings = SmcSettings {
            time_bound: 5.0,
            step_bound: 1_000,
            estimation_interval_width: 0.1,
            confidence: 0.9,
            ..SmcSettings::default()
        };
        let a = verify(&net, &m0, &q, &settings, 99, &CancelToken::new()).unwrap();
        let b = verify(&net, &m0, &q, &settings, 99, &CancelToken::new()).unwrap();
        assert_eq!(a.satisfied, b.satisfied);
        assert_eq!(a.runs, b.runs);
        match a.result {
            SmcResult::Estimate { mean, .. } => {
                // P(N(5) ≥ 10) for a unit-rate Poisson process ≈ 0.032;
                // a generous band guards the test against sampling noise.
                assert!(mean < 0.2, "estimate {mean} far from the analytic value");
            }
            other => panic!("expected an estimate, got {other:?}"),
        }
    }

    #[test]
    fn sprt_accepts_the_right_hypothesis() {
        let (net, m0) = ticking_net(Law::Exponential(1.0));
        let settings = SmcSettings {
            time_bound: 5.0,
            step_bound: 1_000,
            compare_to_float: true,
            geq_than: 0.3,
            ..SmcSettings::default()
        };

        // P(ticks ≥ 10 within 5) ≈ 0.03 « 0.3: H₁ must win.
        let q = parse("EF ticks >= 10", &net).unwrap();
        for seed in [1u64, 2, 3] {
            let out = verify(&net, &m0, &q, &settings, seed, &CancelToken::new()).unwrap();
            assert_eq!(out.result, SmcResult::Accepted { holds: false }, "seed {seed}");
        }

        // P(ticks ≥ 1 within 5) ≈ 0.993 » 0.3: H₀ must win.
        let q = parse("EF ticks >= 1", &net).unwrap();
        for seed in [1u64, 2, 3] {
            let out = verify(&net, &m0, &q, &settings, seed, &CancelToken::new()).unwrap();
            assert_eq!(out.result, SmcResult::Accepted { holds: true }, "seed {seed}");
        }
    }

    #[test]
    fn ag_runs_fail_on_violation() {
        // The loop always ticks past 2 well before time 50.
        let (net, m0) = ticking_net(Law::Constant(1.0));
        let q = parse("AG ticks <= 2", &net).unwrap();
        let settings = SmcSettings {
            time_bound: 50.0,
            step_bound: 1_000,
            estimation_interval_width: 0.5,
            ..SmcSettings::default()
        };
        let out = verify(&net, &m0, &q, &settings, 5, &CancelToken::new()).unwrap();
        assert_eq!(out.satisfied, 0);
    }

    #[test]
    fn invariants_kill_runs_dead() {
        // The only transition needs age ≥ 4 but the invariant caps at 2.
        let mut t = Transition::new("t");
        t.distribution = Some(FiringDistribution::constant(4.0));
        t.preset.push(InputArc { place: PlaceIdx(0), interval: interval(4, 9), mult: 1 });
        t.postset.push(OutputArc { place: PlaceIdx(1), mult: 1 });
        let net = Tapn::new(
            vec![
                Place::new("p0", Invariant::AtMost(2)),
                Place::new("p1", Invariant::Unbounded),
            ],
            vec![t],
        )
        .unwrap();
        let mut m0 = Marking::new(2);
        m0.add(PlaceIdx(0), Token { age: 0, count: 1 });

        let q = parse("EF p1 >= 1", &net).unwrap();
        let settings = SmcSettings {
            time_bound: 100.0,
            estimation_interval_width: 0.5,
            ..SmcSettings::default()
        };
        let out = verify(&net, &m0, &q, &settings, 3, &CancelToken::new()).unwrap();
        assert_eq!(out.satisfied, 0, "no run can fire through the invariant");
    }

    #[test]
    fn urgent_transitions_preempt_time() {
        use crate::model::TransportArc;
        // u is urgent and must fire before slow ever samples its delay in.
        let mut u = Transition::new("u");
        u.urgent = true;
        u.preset.push(InputArc { place: PlaceIdx(0), interval: interval(0, 9), mult: 1 });
        u.postset.push(OutputArc { place: PlaceIdx(1), mult: 1 });
        let mut slow = Transition::new("slow");
        slow.distribution = Some(FiringDistribution::constant(5.0));
        slow.transports.push(TransportArc {
            source: PlaceIdx(0),
            dest: PlaceIdx(2),
            interval: interval(0, 9),
            mult: 1,
        });
        let net = Tapn::new(
            vec![
                Place::new("p0", Invariant::Unbounded),
                Place::new("fast_out", Invariant::Unbounded),
                Place::new("slow_out", Invariant::Unbounded),
            ],
            vec![u, slow],
        )
        .unwrap();
        let mut m0 = Marking::new(3);
        m0.add(PlaceIdx(0), Token { age: 0, count: 1 });

        let q = parse("EF fast_out >= 1", &net).unwrap();
        let settings =
            SmcSettings { time_bound: 50.0, estimation_interval_width: 0.5, ..SmcSettings::default() };
        let out = verify(&net, &m0, &q, &settings, 11, &CancelToken::new()).unwrap();
        assert_eq!(out.satisfied, out.runs, "urgency must always win the race");
    }

    #[test]
    fn chernoff_bound_grows_with_precision() {
        let loose = chernoff_runs(0.9, 0.2);
        let tight = chernoff_runs(0.99, 0.05);
        assert!(loose >= 1);
        assert!(tight > loose);
    }
}
