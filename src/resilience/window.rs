//! Bucketed rolling window of call outcomes.
//!
//! The window is split into fixed-width buckets. Recording always lands in the
//! newest bucket; buckets older than the window length fall off the front as
//! time advances. Totals are the sum over the live buckets.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// One outcome observed by a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Success,
    Failure,
    Timeout,
    /// Call short-circuited without running.
    Reject,
    /// Fallback payload served in place of a real result.
    Fallback,
    /// Well-formed domain outcome (not found, conflict). Never a fault.
    ApplicationError,
}

/// Outcome counters for a bucket or for the whole window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowCounts {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejects: u64,
    pub fallbacks: u64,
    pub application_errors: u64,
}

impl WindowCounts {
    /// Calls that count toward the failure percentage.
    pub fn counted(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    /// Failed or timed-out calls as a percentage of counted calls.
    pub fn failure_percentage(&self) -> f64 {
        let counted = self.counted();
        if counted == 0 {
            return 0.0;
        }
        (self.failures + self.timeouts) as f64 * 100.0 / counted as f64
    }

    fn record(&mut self, event: Event) {
        match event {
            Event::Success => self.successes += 1,
            Event::Failure => self.failures += 1,
            Event::Timeout => self.timeouts += 1,
            Event::Reject => self.rejects += 1,
            Event::Fallback => self.fallbacks += 1,
            Event::ApplicationError => self.application_errors += 1,
        }
    }

    fn add(&mut self, other: &WindowCounts) {
        self.successes += other.successes;
        self.failures += other.failures;
        self.timeouts += other.timeouts;
        self.rejects += other.rejects;
        self.fallbacks += other.fallbacks;
        self.application_errors += other.application_errors;
    }
}

/// Rolling window over the last `bucket_span * bucket_count`.
#[derive(Debug)]
pub struct RollingWindow {
    buckets: VecDeque<WindowCounts>,
    bucket_span: Duration,
    bucket_count: usize,
    /// Start of the newest bucket.
    current_started: Instant,
}

impl RollingWindow {
    pub fn new(window: Duration, buckets: u32, now: Instant) -> Self {
        let bucket_count = buckets.max(1) as usize;
        let bucket_span = (window / bucket_count as u32).max(Duration::from_millis(1));
        let mut deque = VecDeque::with_capacity(bucket_count);
        deque.push_back(WindowCounts::default());
        Self {
            buckets: deque,
            bucket_span,
            bucket_count,
            current_started: now,
        }
    }

    pub fn record(&mut self, event: Event, now: Instant) {
        self.rotate(now);
        if let Some(bucket) = self.buckets.back_mut() {
            bucket.record(event);
        }
    }

    pub fn totals(&mut self, now: Instant) -> WindowCounts {
        self.rotate(now);
        let mut totals = WindowCounts::default();
        for bucket in &self.buckets {
            totals.add(bucket);
        }
        totals
    }

    /// Drop all history.
    pub fn clear(&mut self, now: Instant) {
        self.buckets.clear();
        self.buckets.push_back(WindowCounts::default());
        self.current_started = now;
    }

    fn rotate(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.current_started);
        if elapsed >= self.bucket_span * self.bucket_count as u32 {
            self.clear(now);
            return;
        }

        while now.saturating_duration_since(self.current_started) >= self.bucket_span {
            self.current_started += self.bucket_span;
            self.buckets.push_back(WindowCounts::default());
            if self.buckets.len() > self.bucket_count {
                self.buckets.pop_front();
            }
        }
    }
}
