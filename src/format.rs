//! JSON net descriptions — the input collaborator
//!
//! The core consumes validated in-memory nets; this module is the small
//! adapter that reads them (plus the initial marking and an options record)
//! from JSON documents. Mirror DTO types derive serde and are converted
//! with full validation: name references resolve against the declared
//! places, intervals and distribution parameters are checked, and the
//! initial marking must satisfy every place invariant. Queries use the
//! textual syntax of [`crate::query::parse`].
//!
//! A net document looks like:
//!
//! ```json
//! {
//!   "places": [
//!     { "name": "in" },
//!     { "name": "buf", "invariant": { "bound": 4 }, "kind": "dead" }
//!   ],
//!   "transitions": [
//!     {
//!       "name": "move",
//!       "urgent": false,
//!       "weight": 2.0,
//!       "distribution": { "law": "exponential", "rate": 1.5 },
//!       "input": [ { "place": "in", "interval": { "lo": 0, "hi": 3 } } ],
//!       "output": [ { "place": "buf", "mult": 2 } ]
//!     }
//!   ],
//!   "marking": { "in": [ { "age": 0, "count": 1 } ] }
//! }
//! ```

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::marking::{Marking, Token};
use crate::model::{
    InhibitorArc, InputArc, Invariant, ModelError, OutputArc, Place, PlaceIdx, PlaceKind, Tapn,
    TimeInterval, TransportArc, Transition,
};
use crate::smc::{FiringDistribution, Law, SmcSettings};
use crate::{SearchOrder, VerificationMode, VerificationOptions};

/// Errors surfaced while reading documents.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown place `{0}`")]
    UnknownPlace(String),
    #[error("duplicate place name `{0}`")]
    DuplicatePlace(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("initial marking violates the invariant of place `{0}`")]
    MarkingViolatesInvariant(String),
    #[error("initial marking token needs count >= 1 in place `{0}`")]
    ZeroCountToken(String),
    #[error("unknown {what} `{got}` (expected one of {expected})")]
    BadKeyword { what: &'static str, got: String, expected: &'static str },
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct NetDoc {
    pub places: Vec<PlaceDoc>,
    #[serde(default)]
    pub transitions: Vec<TransitionDoc>,
    /// Initial marking: place name → token runs.
    #[serde(default)]
    pub marking: BTreeMap<String, Vec<TokenDoc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlaceDoc {
    pub name: String,
    /// Absent means unbounded age.
    #[serde(default)]
    pub invariant: Option<BoundDoc>,
    /// `"std"` (default) or `"dead"`.
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BoundDoc {
    pub bound: u32,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenDoc {
    pub age: u32,
    #[serde(default = "one")]
    pub count: u32,
}

fn one() -> u32 {
    1
}

fn one_f64() -> f64 {
    1.0
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionDoc {
    pub name: String,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default = "one_f64")]
    pub weight: f64,
    #[serde(default)]
    pub distribution: Option<DistributionDoc>,
    #[serde(default)]
    pub input: Vec<InputArcDoc>,
    #[serde(default)]
    pub output: Vec<OutputArcDoc>,
    #[serde(default)]
    pub transport: Vec<TransportArcDoc>,
    #[serde(default)]
    pub inhibitor: Vec<InhibitorArcDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "lowercase")]
pub enum DistributionDoc {
    Constant {
        value: f64,
        #[serde(default)]
        discrete: bool,
    },
    Uniform {
        a: f64,
        b: f64,
        #[serde(default)]
        discrete: bool,
    },
    Exponential {
        rate: f64,
        #[serde(default)]
        discrete: bool,
    },
    Normal {
        mean: f64,
        stddev: f64,
        #[serde(default)]
        discrete: bool,
    },
    Gamma {
        shape: f64,
        scale: f64,
        #[serde(default)]
        discrete: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntervalDoc {
    #[serde(default)]
    pub lo: u32,
    /// Absent means right-open.
    #[serde(default)]
    pub hi: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InputArcDoc {
    pub place: String,
    #[serde(default)]
    pub interval: Option<IntervalDoc>,
    #[serde(default = "one")]
    pub mult: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutputArcDoc {
    pub place: String,
    #[serde(default = "one")]
    pub mult: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransportArcDoc {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub interval: Option<IntervalDoc>,
    #[serde(default = "one")]
    pub mult: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InhibitorArcDoc {
    pub place: String,
    #[serde(default = "one")]
    pub weight: u32,
}

/// Serialisable options record; every field optional over the defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OptionsDoc {
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub step_bound: Option<u64>,
    /// Wall-clock budget in seconds.
    #[serde(default)]
    pub time_bound: Option<f64>,
    #[serde(default)]
    pub trace: Option<bool>,
    #[serde(default)]
    pub keep_dead_tokens: Option<bool>,
    #[serde(default)]
    pub time_darts: Option<bool>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub smc: Option<SmcSettingsDoc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SmcSettingsDoc {
    #[serde(default)]
    pub time_bound: Option<f64>,
    #[serde(default)]
    pub step_bound: Option<u64>,
    #[serde(default)]
    pub false_positives: Option<f64>,
    #[serde(default)]
    pub false_negatives: Option<f64>,
    #[serde(default)]
    pub indifference_up: Option<f64>,
    #[serde(default)]
    pub indifference_down: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub estimation_interval_width: Option<f64>,
    #[serde(default)]
    pub compare_to_float: Option<bool>,
    #[serde(default)]
    pub geq_than: Option<f64>,
}

// ============================================================================
// Conversions
// ============================================================================

/// Read a net plus its initial marking from JSON text.
pub fn load_net(text: &str) -> Result<(Tapn, Marking), FormatError> {
    let doc: NetDoc = serde_json::from_str(text)?;
    net_from_doc(&doc)
}

pub fn net_from_doc(doc: &NetDoc) -> Result<(Tapn, Marking), FormatError> {
    let mut places = Vec::with_capacity(doc.places.len());
    for p in &doc.places {
        if places.iter().any(|q: &Place| q.name == p.name) {
            return Err(FormatError::DuplicatePlace(p.name.clone()));
        }
        let invariant = match &p.invariant {
            None => Invariant::Unbounded,
            Some(b) => Invariant::from_bound(b.strict, b.bound),
        };
        let kind = match p.kind.as_deref() {
            None | Some("std") => PlaceKind::Std,
            Some("dead") => PlaceKind::Dead,
            Some(other) => {
                return Err(FormatError::BadKeyword {
                    what: "place kind",
                    got: other.to_string(),
                    expected: "std, dead",
                })
            }
        };
        let mut place = Place::new(p.name.clone(), invariant);
        place.kind = kind;
        places.push(place);
    }

    let resolve = |name: &str| -> Result<PlaceIdx, FormatError> {
        places
            .iter()
            .position(|p| p.name == name)
            .map(PlaceIdx)
            .ok_or_else(|| FormatError::UnknownPlace(name.to_string()))
    };
    let interval = |doc: &Option<IntervalDoc>| -> Result<TimeInterval, FormatError> {
        Ok(match doc {
            None => TimeInterval::unbounded(),
            Some(i) => TimeInterval::new(i.lo, i.hi)?,
        })
    };

    let mut transitions = Vec::with_capacity(doc.transitions.len());
    for t in &doc.transitions {
        let mut tr = Transition::new(t.name.clone());
        tr.urgent = t.urgent;
        tr.weight = t.weight;
        tr.distribution = t.distribution.as_ref().map(distribution_from_doc);
        for arc in &t.input {
            tr.preset.push(InputArc {
                place: resolve(&arc.place)?,
                interval: interval(&arc.interval)?,
                mult: arc.mult,
            });
        }
        for arc in &t.output {
            tr.postset.push(OutputArc { place: resolve(&arc.place)?, mult: arc.mult });
        }
        for arc in &t.transport {
            tr.transports.push(TransportArc {
                source: resolve(&arc.from)?,
                dest: resolve(&arc.to)?,
                interval: interval(&arc.interval)?,
                mult: arc.mult,
            });
        }
        for arc in &t.inhibitor {
            tr.inhibitors.push(InhibitorArc { place: resolve(&arc.place)?, weight: arc.weight });
        }
        transitions.push(tr);
    }

    let mut marking = Marking::new(places.len());
    for (name, tokens) in &doc.marking {
        let place = resolve(name)?;
        let invariant = places[place.as_usize()].invariant;
        for tok in tokens {
            if tok.count == 0 {
                return Err(FormatError::ZeroCountToken(name.clone()));
            }
            if !invariant.permits(tok.age) {
                return Err(FormatError::MarkingViolatesInvariant(name.clone()));
            }
            marking.add(place, Token { age: tok.age, count: tok.count });
        }
    }

    let net = Tapn::new(places, transitions)?;
    Ok((net, marking))
}

fn distribution_from_doc(doc: &DistributionDoc) -> FiringDistribution {
    let (law, discrete) = match *doc {
        DistributionDoc::Constant { value, discrete } => (Law::Constant(value), discrete),
        DistributionDoc::Uniform { a, b, discrete } => (Law::Uniform(a, b), discrete),
        DistributionDoc::Exponential { rate, discrete } => (Law::Exponential(rate), discrete),
        DistributionDoc::Normal { mean, stddev, discrete } => (Law::Normal(mean, stddev), discrete),
        DistributionDoc::Gamma { shape, scale, discrete } => (Law::Gamma(shape, scale), discrete),
    };
    FiringDistribution { law, discrete }
}

/// Read an options record from JSON text, layering it over the defaults.
pub fn load_options(text: &str) -> Result<VerificationOptions, FormatError> {
    let doc: OptionsDoc = serde_json::from_str(text)?;
    options_from_doc(&doc)
}

pub fn options_from_doc(doc: &OptionsDoc) -> Result<VerificationOptions, FormatError> {
    let mut options = VerificationOptions::default();
    if let Some(order) = &doc.order {
        options.order = parse_order(order)?;
    }
    if let Some(mode) = &doc.mode {
        options.mode = parse_mode(mode)?;
    }
    options.step_bound = doc.step_bound.or(options.step_bound);
    options.time_bound = doc
        .time_bound
        .map(std::time::Duration::from_secs_f64)
        .or(options.time_bound);
    if let Some(trace) = doc.trace {
        options.trace = trace;
    }
    if let Some(keep) = doc.keep_dead_tokens {
        options.keep_dead_tokens = keep;
    }
    if let Some(darts) = doc.time_darts {
        options.time_darts = darts;
    }
    if let Some(seed) = doc.seed {
        options.seed = seed;
    }
    if let Some(smc) = &doc.smc {
        options.smc = Some(smc_settings_from_doc(smc));
    }
    Ok(options)
}

pub fn parse_order(text: &str) -> Result<SearchOrder, FormatError> {
    Ok(match text {
        "bfs" => SearchOrder::Bfs,
        "dfs" => SearchOrder::Dfs,
        "heuristic" => SearchOrder::Heuristic,
        "heuristic-stack" => SearchOrder::HeuristicStack,
        "random" => SearchOrder::Random,
        "random-stack" => SearchOrder::RandomStack,
        other => {
            return Err(FormatError::BadKeyword {
                what: "search order",
                got: other.to_string(),
                expected: "bfs, dfs, heuristic, heuristic-stack, random, random-stack",
            })
        }
    })
}

pub fn parse_mode(text: &str) -> Result<VerificationMode, FormatError> {
    Ok(match text {
        "reachability" => VerificationMode::Reachability,
        "liveness" => VerificationMode::Liveness,
        "workflow" => VerificationMode::Workflow,
        "smc" => VerificationMode::Smc,
        other => {
            return Err(FormatError::BadKeyword {
                what: "verification mode",
                got: other.to_string(),
                expected: "reachability, liveness, workflow, smc",
            })
        }
    })
}

pub fn smc_settings_from_doc(doc: &SmcSettingsDoc) -> SmcSettings {
    let mut s = SmcSettings::default();
    if let Some(v) = doc.time_bound {
        s.time_bound = v;
    }
    if let Some(v) = doc.step_bound {
        s.step_bound = v;
    }
    if let Some(v) = doc.false_positives {
        s.false_positives = v;
    }
    if let Some(v) = doc.false_negatives {
        s.false_negatives = v;
    }
    if let Some(v) = doc.indifference_up {
        s.indifference_up = v;
    }
    if let Some(v) = doc.indifference_down {
        s.indifference_down = v;
    }
    if let Some(v) = doc.confidence {
        s.confidence = v;
    }
    if let Some(v) = doc.estimation_interval_width {
        s.estimation_interval_width = v;
    }
    if let Some(v) = doc.compare_to_float {
        s.compare_to_float = v;
    }
    if let Some(v) = doc.geq_than {
        s.geq_than = v;
    }
    s
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransIdx;

    const PIPELINE: &str = r#"{
        "places": [
            { "name": "in" },
            { "name": "buf", "invariant": { "bound": 4 } },
            { "name": "trash", "kind": "dead" },
            { "name": "out" }
        ],
        "transitions": [
            {
                "name": "stash",
                "distribution": { "law": "exponential", "rate": 1.5 },
                "input": [ { "place": "in", "interval": { "lo": 0, "hi": 3 } } ],
                "output": [ { "place": "buf", "mult": 2 } ]
            },
            {
                "name": "ship",
                "urgent": true,
                "weight": 2.5,
                "transport": [ { "from": "buf", "to": "out", "interval": { "lo": 1 } } ],
                "inhibitor": [ { "place": "trash" } ]
            }
        ],
        "marking": { "in": [ { "age": 0 }, { "age": 2, "count": 3 } ] }
    }"#;

    #[test]
    fn full_document_round_trips_into_the_model() {
        let (net, marking) = load_net(PIPELINE).unwrap();
        assert_eq!(net.num_places(), 4);
        assert_eq!(net.num_transitions(), 2);

        let buf = net.place_by_name("buf").unwrap();
        assert_eq!(net.place(buf).invariant, Invariant::AtMost(4));
        let trash = net.place_by_name("trash").unwrap();
        assert_eq!(net.place(trash).kind, PlaceKind::Dead);

        let stash = net.transition(TransIdx(0));
        assert_eq!(stash.preset.len(), 1);
        assert_eq!(stash.preset[0].interval.hi, Some(3));
        assert_eq!(stash.postset[0].mult, 2);
        assert_eq!(stash.distribution.unwrap().law, Law::Exponential(1.5));

        let ship = net.transition(TransIdx(1));
        assert!(ship.urgent);
        assert_eq!(ship.weight, 2.5);
        assert_eq!(ship.transports[0].interval.hi, None);
        assert_eq!(ship.inhibitors[0].weight, 1);

        let inp = net.place_by_name("in").unwrap();
        assert_eq!(marking.count(inp), 4);
        assert_eq!(marking.tokens_in(inp).len(), 2);
    }

    #[test]
    fn name_and_invariant_errors_are_precise() {
        let bad = PIPELINE.replace("\"place\": \"in\",", "\"place\": \"nowhere\",");
        assert!(matches!(load_net(&bad), Err(FormatError::UnknownPlace(p)) if p == "nowhere"));

        let bad = r#"{
            "places": [ { "name": "p", "invariant": { "bound": 1 } } ],
            "marking": { "p": [ { "age": 5 } ] }
        }"#;
        assert!(matches!(load_net(bad), Err(FormatError::MarkingViolatesInvariant(p)) if p == "p"));

        let bad = r#"{ "places": [ { "name": "p" }, { "name": "p" } ] }"#;
        assert!(matches!(load_net(bad), Err(FormatError::DuplicatePlace(_))));

        let bad = r#"{
            "places": [ { "name": "p" } ],
            "transitions": [ {
                "name": "t",
                "distribution": { "law": "exponential", "rate": -1.0 },
                "input": [ { "place": "p" } ]
            } ]
        }"#;
        assert!(matches!(load_net(bad), Err(FormatError::Model(_))));
    }

    #[test]
    fn options_layer_over_defaults() {
        let opts = load_options(
            r#"{
                "order": "random-stack",
                "mode": "smc",
                "seed": 9,
                "trace": true,
                "smc": { "compare_to_float": true, "geq_than": 0.25 }
            }"#,
        )
        .unwrap();
        assert_eq!(opts.order, SearchOrder::RandomStack);
        assert_eq!(opts.mode, VerificationMode::Smc);
        assert_eq!(opts.seed, 9);
        assert!(opts.trace);
        let smc = opts.smc.unwrap();
        assert!(smc.compare_to_float);
        assert_eq!(smc.geq_than, 0.25);
        // Untouched fields keep their defaults.
        assert_eq!(smc.confidence, 0.95);
        assert!(opts.step_bound.is_none());

        assert!(matches!(
            load_options(r#"{ "order": "sideways" }"#),
            Err(FormatError::BadKeyword { .. })
        ));
    }
}
