//! Buffer swap profiling
//!
//! Times how long presenting a frame blocks. A present that regularly takes
//! longer than a millisecond waits for a free buffer, which points to double
//! buffering; a cheap present means a spare buffer is available.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use tessera::renderer::{BufferingMode, SwapProfiler};
//!
//! let mut profiler = SwapProfiler::new();
//! let mut verdict = None;
//! for _ in 0..500 {
//!     verdict = profiler.record(Duration::from_micros(150));
//! }
//! assert_eq!(verdict, Some(BufferingMode::Triple));
//! ```

use log::{info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Samples folded into one verdict
pub const DEFAULT_SAMPLES: u32 = 500;

/// Mean swap time above which presents count as blocking
pub const DEFAULT_BLOCKING_THRESHOLD: Duration = Duration::from_millis(1);

/// Mean the smoothing starts from
const INITIAL_MEAN: Duration = Duration::from_millis(2);

/// Weight of the running mean against a new sample
const HISTORY_WEIGHT: u32 = 10;

/// Buffering behaviour inferred from swap timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BufferingMode {
    /// Presents block: double buffering
    Double,
    /// Presents return at once: triple buffering
    Triple,
}

impl BufferingMode {
    /// Single-letter code: `'d'` or `'t'`
    pub fn as_char(&self) -> char {
        match self {
            BufferingMode::Double => 'd',
            BufferingMode::Triple => 't',
        }
    }
}

/// Smoothed timer around buffer presents
#[derive(Debug, Clone)]
pub struct SwapProfiler {
    samples: u32,
    threshold: Duration,
    mean: Duration,
    count: u32,
    started: Option<Instant>,
}

impl Default for SwapProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapProfiler {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_SAMPLES, DEFAULT_BLOCKING_THRESHOLD)
    }

    /// Profiler deciding after `samples` presents; `samples` of zero is
    /// treated as one
    pub fn with_settings(samples: u32, threshold: Duration) -> Self {
        Self {
            samples: samples.max(1),
            threshold,
            mean: INITIAL_MEAN,
            count: 0,
            started: None,
        }
    }

    /// Starts timing; call right before presenting
    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stops timing; returns a verdict once enough samples are in
    pub fn end(&mut self) -> Option<BufferingMode> {
        let Some(started) = self.started.take() else {
            warn!("⚠️ Swap profiler end() without begin()");
            return None;
        };
        self.record(started.elapsed())
    }

    /// Folds one swap duration into the running mean
    pub fn record(&mut self, elapsed: Duration) -> Option<BufferingMode> {
        self.mean = (self.mean * HISTORY_WEIGHT + elapsed) / (HISTORY_WEIGHT + 1);
        self.count += 1;
        if self.count < self.samples {
            return None;
        }

        let mode = if self.mean > self.threshold {
            BufferingMode::Double
        } else {
            BufferingMode::Triple
        };
        info!(
            "⏱️ Swap profile: mean {:?} over {} presents -> {:?} buffering",
            self.mean, self.count, mode
        );
        self.mean = INITIAL_MEAN;
        self.count = 0;
        Some(mode)
    }

    /// Current smoothed swap time
    pub fn mean(&self) -> Duration {
        self.mean
    }

    /// Samples collected towards the next verdict
    pub fn sample_count(&self) -> u32 {
        self.count
    }
}
