#![forbid(unsafe_code)]

use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub(crate) const LOG_ENV: &str = "REGRESS_LOG";

/// Install the stderr logger. Stdout carries the protocol and stays clean.
pub(crate) fn init() {
    let raw = std::env::var(LOG_ENV).unwrap_or_default();
    let (targets, rejected) = parse_targets(&raw);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(targets);
    tracing_subscriber::registry().with(layer).init();

    if rejected {
        tracing::warn!(value = %raw, "ignoring unparsable {LOG_ENV}; using info");
    }
}

fn parse_targets(raw: &str) -> (Targets, bool) {
    let default = Targets::new().with_default(LevelFilter::INFO);
    let raw = raw.trim();
    if raw.is_empty() {
        return (default, false);
    }
    match raw.parse::<Targets>() {
        Ok(targets) => (targets, false),
        Err(_) => (default, true),
    }
}
