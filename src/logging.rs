//! Logger installation and per-run outcome counters.
//!
//! Every batch component logs one line per failed item, prefixed with the
//! observation id and its UTC, and a one-line summary of its
//! [`OutcomeCounters`] on exit.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Once;

use log::{info, warn, LevelFilter};

use crate::constants::UnixTime;
use crate::pigazing_errors::PiGazingError;
use crate::time::iso;

static INIT_LOGGER: Once = Once::new();

/// Install the `env_logger` backend once.
///
/// `verbosity` 0 logs warnings, 1 informational lines, 2 debug and 3+ trace.
/// `RUST_LOG` overrides the level when set.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .format_timestamp_secs()
            .try_init();
    });
}

/// Named counters of item outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeCounters {
    component: String,
    counts: BTreeMap<String, usize>,
}

impl OutcomeCounters {
    pub fn new(component: impl Into<String>) -> Self {
        OutcomeCounters {
            component: component.into(),
            counts: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, outcome: &str) {
        self.add(outcome, 1);
    }

    pub fn add(&mut self, outcome: &str, n: usize) {
        *self.counts.entry(outcome.to_string()).or_insert(0) += n;
    }

    pub fn get(&self, outcome: &str) -> usize {
        self.counts.get(outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Count a per-item failure and log it against the item.
    pub fn item_failed(&mut self, item: &str, utc: UnixTime, error: &PiGazingError) {
        let outcome = error.counter_name();
        warn!("{item} [{}] {outcome}: {error}", iso(utc));
        self.increment(outcome);
    }

    /// Log the summary line.
    pub fn log_summary(&self) {
        info!("{self}");
    }
}

impl fmt::Display for OutcomeCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.component)?;
        if self.counts.is_empty() {
            return write!(f, " nothing to do");
        }
        for (outcome, n) in &self.counts {
            write!(f, " {outcome}={n}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod logging_test {
    use super::*;

    #[test]
    fn test_counters() {
        init(0);
        let mut counters = OutcomeCounters::new("triangulation");
        assert_eq!(counters.to_string(), "triangulation: nothing to do");
        counters.increment("triangulated");
        counters.item_failed(
            "20210101_a",
            1_609_459_200.0,
            &PiGazingError::missing("observatory a", "camera_lens"),
        );
        counters.add("triangulated", 2);
        assert_eq!(counters.get("triangulated"), 3);
        assert_eq!(counters.get("missing_metadata"), 1);
        assert_eq!(counters.total(), 4);
        assert_eq!(
            counters.to_string(),
            "triangulation: missing_metadata=1 triangulated=3"
        );
    }
}
