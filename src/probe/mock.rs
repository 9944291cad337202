//! Synthetic probe replaying a configured sequence of outcomes.

use super::{ProbeOutcome, ProbeSettings};

use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_REASON: &str = "synthetic failure";

#[derive(Debug)]
pub struct MockProbe {
    sequence: Vec<bool>,
    reason: String,
    cursor: AtomicUsize,
}

impl MockProbe {
    /// An empty sequence means the probe is always up.
    pub fn new(settings: &ProbeSettings) -> Self {
        Self {
            sequence: settings.sequence.clone(),
            reason: if settings.reason.is_empty() {
                DEFAULT_REASON.to_string()
            } else {
                settings.reason.clone()
            },
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn test(&self) -> ProbeOutcome {
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        if self.sequence.is_empty() {
            return ProbeOutcome::up();
        }

        if self.sequence[n % self.sequence.len()] {
            ProbeOutcome::up()
        } else {
            ProbeOutcome::down(self.reason.clone())
        }
    }

    /// Number of checks run so far.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}
