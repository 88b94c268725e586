//! Statistical model checking CLI
//!
//! Loads a JSON net description and a textual `EF`/`AG` query, then either
//! tests `P(φ) ≥ θ` with the SPRT (`--geq`) or estimates `P(φ)` to the
//! requested confidence and interval width.
//!
//! Usage:
//!   simulate --net NET.json --query "EF (out >= 1)"
//!            [--run-time T] [--run-steps N]
//!            [--geq P] [--alpha A] [--beta B] [--delta-up D] [--delta-down D]
//!            [--confidence C] [--width W] [--seed N] [--options OPTS.json]

#![forbid(unsafe_code)]

use std::{env, fs};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use dtapn::{format, query, smc, CancelToken, SmcResult, SmcSettings};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn parse_f64(args: &[String], key: &str) -> anyhow::Result<Option<f64>> {
    match parse_flag(args, key) {
        None => Ok(None),
        Some(text) => {
            Ok(Some(text.parse().with_context(|| format!("{key} expects a number"))?))
        }
    }
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

    let query_text = parse_flag(&args, "--query").context("--query \"EF (...)\" is required")?;
    let query = query::parse(&query_text, &net)?;

    let (mut settings, mut seed) = match parse_flag(&args, "--options") {
        Some(path) => {
            let text =
                fs::read_to_string(&path).with_context(|| format!("reading options {path}"))?;
            let options = format::load_options(&text)?;
            (options.smc.unwrap_or_default(), options.seed)
        }
        None => (SmcSettings::default(), 0),
    };

    if let Some(v) = parse_f64(&args, "--run-time")? {
        settings.time_bound = v;
    }
    if let Some(v) = parse_flag(&args, "--run-steps") {
        settings.step_bound = v.parse().context("--run-steps expects an integer")?;
    }
    if let Some(v) = parse_f64(&args, "--geq")? {
        settings.compare_to_float = true;
        settings.geq_than = v;
    }
    if let Some(v) = parse_f64(&args, "--alpha")? {
        settings.false_positives = v;
    }
    if let Some(v) = parse_f64(&args, "--beta")? {
        settings.false_negatives = v;
    }
    if let Some(v) = parse_f64(&args, "--delta-up")? {
        settings.indifference_up = v;
    }
    if let Some(v) = parse_f64(&args, "--delta-down")? {
        settings.indifference_down = v;
    }
    if let Some(v) = parse_f64(&args, "--confidence")? {
        settings.confidence = v;
    }
    if let Some(v) = parse_f64(&args, "--width")? {
        settings.estimation_interval_width = v;
    }
    if let Some(v) = parse_flag(&args, "--seed") {
        seed = v.parse().context("--seed expects an integer")?;
    }

    let outcome = smc::verify(&net, &initial, &query, &settings, seed, &CancelToken::new())?;
    match outcome.result {
        SmcResult::Accepted { holds } => {
            let relation = if holds { ">=" } else { "<" };
            println!(
                "P(phi) {relation} {} accepted after {} runs ({} satisfied)",
                settings.geq_than, outcome.runs, outcome.satisfied
            );
        }
        SmcResult::Estimate { mean, low, high } => {
            println!(
                "P(phi) estimated as {mean:.4} in [{low:.4}, {high:.4}] \
                 at confidence {} after {} runs",
                settings.confidence, outcome.runs
            );
        }
        SmcResult::Interrupted(reason) => println!("simulation interrupted ({reason:?})"),
    }
    Ok(())
}
