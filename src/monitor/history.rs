//! Fixed-capacity window over the most recent probe outcomes.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct HistoryWindow {
    capacity: usize,
    samples: VecDeque<bool>,
}

impl HistoryWindow {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an outcome, evicting the oldest one when full.
    pub fn record(&mut self, up: bool) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(up);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Decisions are only taken once the window is full.
    pub fn is_saturated(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn down_count(&self) -> usize {
        self.samples.iter().filter(|up| !**up).count()
    }

    /// Share of down outcomes in percent.
    pub fn down_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.down_count() as f64 * 100.0 / self.samples.len() as f64
    }

    /// [`down_rate`](Self::down_rate) truncated, as used by threshold comparisons.
    ///
    /// Computed in integers so that e.g. 29/100 yields 29, not 28.
    pub fn down_percent(&self) -> u32 {
        if self.samples.is_empty() {
            return 0;
        }
        (self.down_count() * 100 / self.samples.len()) as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.samples.iter().copied()
    }
}
