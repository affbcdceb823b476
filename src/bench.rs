//! Component H: optional timing measurements, off the critical path.
//!
//! Modeled as an owned aggregator passed explicitly rather than a singleton
//! (spec.md §9's redesign note applies equally to this component, not just
//! [`crate::switch_compiler::FactorStats`]).

use std::time::Duration;

/// Accumulates named timing samples. Not thread-safe by design: each walk or
/// compile run owns one, and merges are explicit if a caller parallelizes.
#[derive(Debug, Default, Clone)]
pub struct BenchAggregator {
    samples: Vec<(&'static str, Duration)>,
}

impl BenchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: &'static str, elapsed: Duration) {
        self.samples.push((label, elapsed));
    }

    /// Times `f`, records the elapsed duration under `label`, and returns
    /// `f`'s result.
    pub fn timed<T>(&mut self, label: &'static str, f: impl FnOnce() -> T) -> T {
        let start = std::time::Instant::now();
        let result = f();
        self.record(label, start.elapsed());
        result
    }

    pub fn total(&self, label: &str) -> Duration {
        self.samples
            .iter()
            .filter(|(l, _)| *l == label)
            .map(|(_, d)| *d)
            .sum()
    }

    pub fn samples(&self) -> &[(&'static str, Duration)] {
        &self.samples
    }

    pub fn merge(&mut self, other: BenchAggregator) {
        self.samples.extend(other.samples);
    }
}
