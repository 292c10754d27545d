//! Rolling latency over inbound packet gaps
//!
//! Every accepted inbound frame contributes the time since the previous one.
//! The average covers the last `capacity` gaps. Independently a single raw
//! sample is handed to the chart collaborator at most once per chart interval.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_WINDOW: usize = 50;
pub const DEFAULT_CHART_INTERVAL: Duration = Duration::from_millis(1000);

/// A point for the latency chart.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySample {
    pub latency_ms: u64,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyUpdate {
    pub average_ms: f64,
    /// Set when this sample passed the chart throttle
    pub chart_sample: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    capacity: usize,
    sum: u64,
    chart_interval: Duration,
    last_chart_at: Option<Instant>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_CHART_INTERVAL)
    }
}

impl LatencyTracker {
    /// `capacity` is raised to 1 if zero.
    pub fn new(capacity: usize, chart_interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
            chart_interval,
            last_chart_at: None,
        }
    }

    pub fn record(&mut self, gap: Duration, now: Instant) -> LatencyUpdate {
        let sample = u64::try_from(gap.as_millis()).unwrap_or(u64::MAX);

        if self.samples.len() == self.capacity {
            if let Some(evicted) = self.samples.pop_front() {
                self.sum -= evicted;
            }
        }
        self.samples.push_back(sample);
        self.sum = self.sum.saturating_add(sample);

        let chart_due = match self.last_chart_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.chart_interval,
        };
        let chart_sample = if chart_due {
            self.last_chart_at = Some(now);
            Some(sample)
        } else {
            None
        };

        LatencyUpdate {
            average_ms: self.average_ms(),
            chart_sample,
        }
    }

    pub fn average_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum as f64 / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.sum = 0;
        self.last_chart_at = None;
    }
}
