//! Exhaustive verification CLI
//!
//! Loads a JSON net description and a textual query, runs the requested
//! kernel, and prints the verdict, an optional witness trace, and the
//! exploration statistics.
//!
//! Usage:
//!   verify --net NET.json --query "EF (out >= 1)" [--mode reachability]
//!          [--order heuristic] [--darts] [--trace] [--step-bound N]
//!          [--time-bound SECONDS] [--keep-dead-tokens] [--seed N]
//!          [--options OPTS.json]
//!
//! Flags layer over `--options` (when given), which layers over defaults.
//! In workflow mode the query is implicit and may be omitted.

#![forbid(unsafe_code)]

use std::{env, fs, time::Duration};

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use dtapn::search::{self, Outcome, TraceStep, WorkflowOutcome};
use dtapn::{format, query, SearchStats, Step, Tapn, Verdict, VerificationMode, VerificationOptions};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();

    let net_path = parse_flag(&args, "--net").context("--net NET.json is required")?;
    let net_text = fs::read_to_string(&net_path)
        .with_context(|| format!("reading net description {net_path}"))?;
    let (net, initial) = format::load_net(&net_text)?;

    let mut options = match parse_flag(&args, "--options") {
        Some(path) => {
            let text =
                fs::read_to_string(&path).with_context(|| format!("reading options {path}"))?;
            format::load_options(&text)?
        }
        None => VerificationOptions::default(),
    };
    if let Some(order) = parse_flag(&args, "--order") {
        options.order = format::parse_order(&order)?;
    }
    if let Some(mode) = parse_flag(&args, "--mode") {
        options.mode = format::parse_mode(&mode)?;
    }
    if let Some(bound) = parse_flag(&args, "--step-bound") {
        options.step_bound = Some(bound.parse().context("--step-bound expects an integer")?);
    }
    if let Some(bound) = parse_flag(&args, "--time-bound") {
        let secs: f64 = bound.parse().context("--time-bound expects seconds")?;
        options.time_bound = Some(Duration::from_secs_f64(secs));
    }
    if let Some(seed) = parse_flag(&args, "--seed") {
        options.seed = seed.parse().context("--seed expects an integer")?;
    }
    options.trace |= has_flag(&args, "--trace");
    options.time_darts |= has_flag(&args, "--darts");
    options.keep_dead_tokens |= has_flag(&args, "--keep-dead-tokens");

    if options.mode == VerificationMode::Workflow {
        let outcome = search::workflow(&net, &initial, &options);
        print_workflow(&net, &outcome);
        return Ok(());
    }
    if options.mode == VerificationMode::Smc {
        bail!("statistical queries are handled by the `simulate` binary");
    }

    let query_text = parse_flag(&args, "--query").context("--query \"EF (...)\" is required")?;
    let query = query::parse(&query_text, &net)?;
    let outcome = search::verify(&net, &initial, &query, &options)?;
    print_outcome(&net, &outcome);
    Ok(())
}

fn verdict_line(verdict: Verdict) -> String {
    match verdict {
        Verdict::Holds => "satisfied".to_string(),
        Verdict::Fails => "not satisfied".to_string(),
        Verdict::Unknown(reason) => format!("undecided ({reason:?})"),
    }
}

fn print_outcome(net: &Tapn, outcome: &Outcome) {
    println!("query is {}", verdict_line(outcome.verdict));
    if let Some(trace) = &outcome.trace {
        println!("trace:");
        print_trace(net, trace);
    }
    print_stats(net, &outcome.stats);
}

fn print_workflow(net: &Tapn, outcome: &WorkflowOutcome) {
    println!("workflow class: {:?}", outcome.kind);
    match outcome.sound {
        Some(true) => println!("the workflow is sound"),
        Some(false) => println!("the workflow is not sound"),
        None => println!("soundness undecided"),
    }
    if let Some(trace) = &outcome.witness {
        println!("witness:");
        print_trace(net, trace);
    }
    print_stats(net, &outcome.stats);
}

fn print_trace(net: &Tapn, trace: &[TraceStep]) {
    for entry in trace {
        match entry.step {
            None => println!("  initial        {}", render_marking(net, &entry.marking)),
            Some(Step::Delay(dt)) => {
                println!("  delay {dt:<8} {}", render_marking(net, &entry.marking))
            }
            Some(Step::Fire { transition, delay }) => {
                let name = &net.transition(transition).name;
                if delay > 0 {
                    println!("  {name} @+{delay:<6} {}", render_marking(net, &entry.marking));
                } else {
                    println!("  {name:<14} {}", render_marking(net, &entry.marking));
                }
            }
        }
    }
}

fn render_marking(net: &Tapn, marking: &dtapn::Marking) -> String {
    let mut parts = Vec::new();
    for p in 0..net.num_places() {
        let place = dtapn::PlaceIdx(p);
        let tokens = marking.tokens_in(place);
        if tokens.is_empty() {
            continue;
        }
        let runs: Vec<String> =
            tokens.iter().map(|t| format!("{}x age {}", t.count, t.age)).collect();
        parts.push(format!("{}({})", net.place(place).name, runs.join(", ")));
    }
    if parts.is_empty() {
        "empty".to_string()
    } else {
        parts.join(" ")
    }
}

fn print_stats(net: &Tapn, stats: &SearchStats) {
    println!(
        "explored {} markings, stored {}, dropped {}, peak frontier {}",
        stats.explored, stats.stored, stats.dropped, stats.peak_waiting
    );
    let fired: u64 = stats.fired.iter().sum();
    if fired > 0 {
        let per: Vec<String> = stats
            .fired
            .iter()
            .enumerate()
            .filter(|(_, &n)| n > 0)
            .map(|(i, n)| format!("{}: {n}", net.transition(dtapn::TransIdx(i)).name))
            .collect();
        println!("firings: {} ({})", fired, per.join(", "));
    }
}
