//! Progress reporting for long update batches (feature `progress`).
//!
//! Components
//! -----------------
//! * [`BatchProgress`] – An `indicatif` bar over the tracks of a batch, showing the last and
//!   smoothed per-track time.
//! * [`IterTimer`] – Per-iteration durations with an exponential moving average
//!   `ema ← α·dt + (1–α)·ema`, `α ∈ (0, 1]`.
//! * [`fmt_dur`] – Compact duration rendering (`"253µs"`, `"42ms"`, `"3.14s"`).
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

pub struct IterTimer {
    last: Instant,
    ema_ns: f64,
    alpha: f64,
    count: u64,
}

impl IterTimer {
    pub fn new(alpha: f64) -> Self {
        Self {
            last: Instant::now(),
            ema_ns: 0.0,
            alpha: alpha.clamp(f64::MIN_POSITIVE, 1.0),
            count: 0,
        }
    }

    /// Close the current iteration and return its duration.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.count += 1;

        let dt_ns = dt.as_nanos() as f64;
        self.ema_ns = if self.count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };
        dt
    }

    pub fn avg(&self) -> Duration {
        Duration::from_nanos(self.ema_ns as u64)
    }
}

pub fn fmt_dur(d: Duration) -> String {
    match (d.as_micros(), d.as_millis()) {
        (us, _) if us < 1_000 => format!("{us}µs"),
        (_, ms) if ms < 1_000 => format!("{ms}ms"),
        _ => format!("{:.2}s", d.as_secs_f32()),
    }
}

/// Progress bar over the entries of one update batch.
pub struct BatchProgress {
    bar: ProgressBar,
    timer: IterTimer,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total.max(1) as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} tracks ({percent:>3}%) | ETA {eta_precise} | {msg}",
        ) {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(200));
        Self {
            bar,
            timer: IterTimer::new(0.2),
        }
    }

    /// Advance by one track and show its name with the timing.
    pub fn step(&mut self, track: &str) {
        let last = self.timer.tick();
        self.bar.set_message(format!(
            "{track} (last: {}, avg: {})",
            fmt_dur(last),
            fmt_dur(self.timer.avg())
        ));
        self.bar.inc(1);
    }

    pub fn finish(self) {
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod progress_tests {
    use super::*;

    #[test]
    fn test_fmt_dur_scales() {
        assert_eq!(fmt_dur(Duration::from_micros(253)), "253µs");
        assert_eq!(fmt_dur(Duration::from_millis(42)), "42ms");
        assert_eq!(fmt_dur(Duration::from_millis(3140)), "3.14s");
    }

    #[test]
    fn test_timer_first_tick_sets_average() {
        let mut timer = IterTimer::new(0.5);
        assert_eq!(timer.avg(), Duration::ZERO);
        let dt = timer.tick();
        assert_eq!(timer.avg().as_nanos(), dt.as_nanos());
    }
}
