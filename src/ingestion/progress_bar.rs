//! Iteration timing and optional progress reporting for long ingestion loops.
//!
//! Components
//! -----------------
//! * [`IterTimer`] – Tracks per-iteration durations and keeps a smoothed
//!   **exponential moving average** (EMA), `ema ← α·dt + (1–α)·ema`.
//! * [`fmt_dur`] – Human-readable [`Duration`] formatter (`"253µs"`, `"42ms"`, `"3.14s"`).
//! * [`LoopProgress`] – An `indicatif` bar over archives or files when the `progress`
//!   feature is enabled, a no-op otherwise. Per-item timings are always emitted through
//!   `tracing` at debug level.
use std::time::{Duration, Instant};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

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
            alpha,
            count: 0,
        }
    }

    #[inline]
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

    #[inline]
    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.ema_ns as u64)
        }
    }
}

#[inline]
pub fn fmt_dur(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else {
        let ms = d.as_millis();
        if ms < 1_000 {
            format!("{ms}ms")
        } else {
            let s = d.as_secs_f32();
            format!("{s:.2}s")
        }
    }
}

/// Progress over a known number of items (archives, raw files, converted files).
pub struct LoopProgress {
    timer: IterTimer,
    #[cfg(feature = "progress")]
    bar: ProgressBar,
}

impl LoopProgress {
    pub fn new(total: usize) -> Self {
        #[cfg(feature = "progress")]
        let bar = {
            let pb = ProgressBar::new((total as u64).max(1));
            if let Ok(style) = ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | ETA {eta_precise} | {msg}",
            ) {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(200));
            pb
        };
        #[cfg(not(feature = "progress"))]
        let _ = total;

        LoopProgress {
            timer: IterTimer::new(0.2),
            #[cfg(feature = "progress")]
            bar,
        }
    }

    /// Mark the end of one item.
    pub fn item_done(&mut self, name: &str) {
        let last = self.timer.tick();
        let avg = self.timer.avg();
        debug!(item = name, last = %fmt_dur(last), avg = %fmt_dur(avg), "item processed");

        #[cfg(feature = "progress")]
        {
            self.bar
                .set_message(format!("{name} | last: {}, avg: {}", fmt_dur(last), fmt_dur(avg)));
            self.bar.inc(1);
        }
    }

    pub fn finish(self) {
        #[cfg(feature = "progress")]
        self.bar.finish_and_clear();
    }
}
