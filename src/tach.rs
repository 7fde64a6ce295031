/*
 * This file is part of Pifan.
 *
 * Copyright (C) 2025 Pifan contributors
 *
 * Pifan is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Pifan is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Pifan. If not, see <https://www.gnu.org/licenses/>.
 */

//! Tachometer pulse filtering and RPM estimation.
//!
//! The edge handler runs on the hardware binding's interrupt thread and feeds
//! [`PulseFilter::on_edge`]. Accepted pulses are counted in a shared
//! [`PulseCounter`], which the control loop drains once per reporting window.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hardware timestamp in microseconds, wrapping at 2^32.
pub type Tick = u32;

/// Logic level reported with an edge event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

/// A single transition on the tachometer line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub tick: Tick,
    pub level: Level,
}

impl EdgeEvent {
    pub fn falling(tick: Tick) -> Self {
        Self { tick, level: Level::Low }
    }

    pub fn rising(tick: Tick) -> Self {
        Self { tick, level: Level::High }
    }
}

/// Convert a monotonic timestamp into a wrapping microsecond tick.
pub fn tick_from_duration(timestamp: Duration) -> Tick {
    // Truncation is the modulo-2^32 reduction.
    timestamp.as_micros() as Tick
}

/// Microseconds elapsed from `from` to `to`, correct across one counter wrap.
pub fn tick_diff(from: Tick, to: Tick) -> u32 {
    to.wrapping_sub(from)
}

/// Lock-free pulse count shared between the edge handler and the control loop.
#[derive(Debug, Default)]
pub struct PulseCounter {
    count: AtomicU32,
}

impl PulseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one accepted pulse. Safe to call from the interrupt thread.
    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Read and reset the count in one atomic step.
    pub fn take(&self) -> u32 {
        self.count.swap(0, Ordering::AcqRel)
    }

    /// Current count without resetting it.
    #[cfg(test)]
    pub(crate) fn peek(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

/// Outcome of feeding one edge into the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseVerdict {
    /// Rising edge, not a pulse boundary.
    Ignored,
    /// First falling edge; recorded as the reference only.
    Baseline,
    /// Width at or above the threshold; counted.
    Accepted { width_us: u32 },
    /// Narrower than the threshold; treated as noise.
    Rejected { width_us: u32 },
}

/// Glitch filter for tachometer falling edges.
///
/// The reference tick only advances on an accepted pulse, so a burst of
/// bounce edges cannot walk the baseline forward.
#[derive(Debug)]
pub struct PulseFilter {
    min_width_us: u32,
    reference: Option<Tick>,
    counter: Arc<PulseCounter>,
}

impl PulseFilter {
    pub fn new(min_width_us: u32, counter: Arc<PulseCounter>) -> Self {
        Self {
            min_width_us,
            reference: None,
            counter,
        }
    }

    /// Handle one edge. Never blocks and never allocates.
    pub fn on_edge(&mut self, event: EdgeEvent) -> PulseVerdict {
        if event.level != Level::Low {
            return PulseVerdict::Ignored;
        }

        let Some(reference) = self.reference else {
            self.reference = Some(event.tick);
            return PulseVerdict::Baseline;
        };

        let width_us = tick_diff(reference, event.tick);
        if width_us >= self.min_width_us {
            self.counter.record();
            self.reference = Some(event.tick);
            PulseVerdict::Accepted { width_us }
        } else {
            PulseVerdict::Rejected { width_us }
        }
    }

    /// Tick the next width will be measured against.
    pub fn reference(&self) -> Option<Tick> {
        self.reference
    }
}

/// One reporting window's worth of measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpmSample {
    pub rpm: u32,
    pub duty_percent: f32,
    pub window_start: Instant,
    pub window_end: Instant,
}

/// Converts pulse counts into revolutions per minute.
#[derive(Debug, Clone, Copy)]
pub struct RpmEstimator {
    pulses_per_revolution: u32,
}

impl RpmEstimator {
    pub fn new(pulses_per_revolution: u32) -> Self {
        Self { pulses_per_revolution }
    }

    /// `(pulses / window_seconds) * 60 / pulses_per_revolution`, truncated.
    ///
    /// A stalled fan (zero pulses) and a degenerate window both yield 0.
    pub fn rpm(&self, pulses: u32, window: Duration) -> u32 {
        let secs = window.as_secs_f64();
        if pulses == 0 || secs <= 0.0 || self.pulses_per_revolution == 0 {
            return 0;
        }
        let rpm = (pulses as f64 / secs) * 60.0 / self.pulses_per_revolution as f64;
        rpm as u32
    }

    /// Build the sample for the window `[window_start, window_end]`.
    pub fn sample(
        &self,
        pulses: u32,
        duty_percent: f32,
        window_start: Instant,
        window_end: Instant,
    ) -> RpmSample {
        let window = window_end.saturating_duration_since(window_start);
        RpmSample {
            rpm: self.rpm(pulses, window),
            duty_percent,
            window_start,
            window_end,
        }
    }
}
