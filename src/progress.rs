//! Progress reporting for batch loops.
//!
//! [`BatchProgress`] is what components drive: `tick` once per unit of work,
//! `finish` at the end. Without the `progress` feature it only counts; with
//! it, an `indicatif` bar shows the rate, the ETA and the last/smoothed unit
//! duration tracked by [`JobTimer`].
//!
//! The smoothing is an exponential moving average `ema ← α·dt + (1–α)·ema`,
//! initialised by the first sample. `α = 1` disables smoothing.
use std::time::{Duration, Instant};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

/// Duration of the last job and its smoothed value.
#[derive(Debug, Clone)]
pub struct JobTimer {
    started: Instant,
    smoothed: Option<Duration>,
    alpha: f64,
    jobs: u64,
}

impl JobTimer {
    pub fn new(alpha: f64) -> Self {
        JobTimer {
            started: Instant::now(),
            smoothed: None,
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            jobs: 0,
        }
    }

    /// Mark the end of a job; the next one starts now.
    pub fn lap(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        self.started = Instant::now();
        self.jobs += 1;
        self.smoothed = Some(match self.smoothed {
            None => elapsed,
            Some(previous) => elapsed.mul_f64(self.alpha) + previous.mul_f64(1.0 - self.alpha),
        });
        elapsed
    }

    pub fn smoothed(&self) -> Duration {
        self.smoothed.unwrap_or_default()
    }

    pub fn jobs(&self) -> u64 {
        self.jobs
    }
}

/// Render a duration as `"253µs"`, `"42ms"` or `"3.14s"`.
pub fn short_duration(d: Duration) -> String {
    match d.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.2}s", d.as_secs_f64()),
    }
}

/// Progress of a batch of `total` units.
pub struct BatchProgress {
    timer: JobTimer,
    #[cfg(feature = "progress")]
    bar: ProgressBar,
}

impl BatchProgress {
    pub fn new(total: usize, label: &str) -> Self {
        #[cfg(feature = "progress")]
        let bar = {
            let bar = ProgressBar::new((total as u64).max(1));
            if let Ok(style) = ProgressStyle::with_template(
                "{prefix} {bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
            ) {
                bar.set_style(style);
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(200));
            bar
        };
        #[cfg(not(feature = "progress"))]
        let _ = (total, label);

        BatchProgress {
            timer: JobTimer::new(0.2),
            #[cfg(feature = "progress")]
            bar,
        }
    }

    /// One unit of work completed.
    pub fn tick(&mut self) {
        let last = self.timer.lap();
        #[cfg(feature = "progress")]
        {
            self.bar.set_message(format!(
                "last: {}, avg: {}",
                short_duration(last),
                short_duration(self.timer.smoothed())
            ));
            self.bar.inc(1);
        }
        #[cfg(not(feature = "progress"))]
        let _ = last;
    }

    pub fn done(&self) -> u64 {
        self.timer.jobs()
    }

    pub fn finish(self) {
        #[cfg(feature = "progress")]
        self.bar.finish_and_clear();
    }
}
