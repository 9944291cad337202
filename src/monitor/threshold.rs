//! Classification of a history window against the configured thresholds.
//!
//! Three tiers are supported. A global tier (`threshold`/`threshold_count`)
//! wins outright and only ever yields [`Classification::Major`]. Without it,
//! the critical tier is checked first and the partial tier only when critical
//! did not breach. Within a tier a count limit takes precedence over a
//! percentage. Counts compare with `>=`, percentages with `>` on the
//! truncated down rate.

use super::history::HistoryWindow;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Health decision for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Normal,
    Partial,
    Major,
}

impl Classification {
    pub fn is_breach(self) -> bool {
        self != Classification::Normal
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Normal => write!(f, "normal"),
            Classification::Partial => write!(f, "partial"),
            Classification::Major => write!(f, "major"),
        }
    }
}

/// One tier's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Absolute number of down outcomes; breached at `>=`.
    Count(u32),
    /// Truncated down percentage; breached at `>`.
    Percent(u32),
    /// Every sample in the window is down. Only used when no threshold is configured.
    FullyDown,
}

impl Tier {
    fn pick(count: u32, percent: u32) -> Option<Self> {
        if count > 0 {
            Some(Tier::Count(count))
        } else if percent > 0 {
            Some(Tier::Percent(percent))
        } else {
            None
        }
    }

    pub fn breached(self, history: &HistoryWindow) -> bool {
        match self {
            Tier::Count(limit) => history.down_count() >= limit as usize,
            Tier::Percent(limit) => history.down_percent() > limit,
            Tier::FullyDown => !history.is_empty() && history.down_count() == history.len(),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Count(n) => write!(f, "{} (count)", n),
            Tier::Percent(p) => write!(f, "{}% (percent)", p),
            Tier::FullyDown => write!(f, "100% (fully down)"),
        }
    }
}

/// Threshold settings as they appear in a monitor's configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub threshold: u32,
    pub threshold_count: u32,
    #[serde(rename = "threshold_critical")]
    pub critical: u32,
    #[serde(rename = "threshold_critical_count")]
    pub critical_count: u32,
    #[serde(rename = "threshold_partial")]
    pub partial: u32,
    #[serde(rename = "threshold_partial_count")]
    pub partial_count: u32,
    /// Set by [`ThresholdConfig::apply_defaults`] when nothing was configured.
    #[serde(skip)]
    pub(crate) fully_down: bool,
}

impl ThresholdConfig {
    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }

    /// With nothing configured only a fully down window triggers.
    pub fn apply_defaults(&mut self) {
        if self.is_unset() {
            self.threshold = 100;
            self.fully_down = true;
        }
    }

    pub fn global(&self) -> Option<Tier> {
        if self.fully_down {
            return Some(Tier::FullyDown);
        }
        Tier::pick(self.threshold_count, self.threshold)
    }

    pub fn critical(&self) -> Option<Tier> {
        Tier::pick(self.critical_count, self.critical)
    }

    pub fn partial(&self) -> Option<Tier> {
        Tier::pick(self.partial_count, self.partial)
    }

    /// Human readable lines for startup logs.
    pub fn describe(&self) -> Vec<String> {
        if let Some(tier) = self.global() {
            return vec![format!("Threshold: {}", tier)];
        }

        let mut lines = Vec::new();
        if let Some(tier) = self.critical() {
            lines.push(format!("Critical threshold: {}", tier));
        }
        if let Some(tier) = self.partial() {
            lines.push(format!("Partial threshold: {}", tier));
        }
        lines
    }
}

/// Classify the window, or `None` while it is still warming up.
pub fn evaluate(history: &HistoryWindow, thresholds: &ThresholdConfig) -> Option<Classification> {
    if !history.is_saturated() {
        return None;
    }

    if history.down_count() == 0 {
        return Some(Classification::Normal);
    }

    if let Some(tier) = thresholds.global() {
        return Some(if tier.breached(history) {
            Classification::Major
        } else {
            Classification::Normal
        });
    }

    if thresholds.critical().is_some_and(|t| t.breached(history)) {
        return Some(Classification::Major);
    }

    if thresholds.partial().is_some_and(|t| t.breached(history)) {
        return Some(Classification::Partial);
    }

    Some(Classification::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(outcomes: &[bool]) -> HistoryWindow {
        let mut w = HistoryWindow::new(outcomes.len());
        for &up in outcomes {
            w.record(up);
        }
        w
    }

    const U: bool = true;
    const D: bool = false;

    #[test]
    fn test_unsaturated_is_undetermined() {
        let mut w = HistoryWindow::new(5);
        for _ in 0..4 {
            w.record(D);
        }
        let thresholds = ThresholdConfig {
            threshold_count: 1,
            ..Default::default()
        };
        assert_eq!(evaluate(&w, &thresholds), None);
    }

    #[test]
    fn test_percent_is_strict() {
        let thresholds = ThresholdConfig {
            critical: 60,
            ..Default::default()
        };
        assert_eq!(
            evaluate(&window(&[U, U, D, D, D]), &thresholds),
            Some(Classification::Normal)
        );
        assert_eq!(
            evaluate(&window(&[U, D, D, D, D]), &thresholds),
            Some(Classification::Major)
        );
    }

    #[test]
    fn test_count_is_inclusive() {
        let thresholds = ThresholdConfig {
            critical_count: 3,
            ..Default::default()
        };
        assert_eq!(
            evaluate(&window(&[U, U, D, D, D]), &thresholds),
            Some(Classification::Major)
        );
        assert_eq!(
            evaluate(&window(&[U, U, U, D, D]), &thresholds),
            Some(Classification::Normal)
        );
    }

    #[test]
    fn test_count_takes_precedence_over_percent() {
        let thresholds = ThresholdConfig {
            critical: 10,
            critical_count: 4,
            ..Default::default()
        };
        // 60% would breach the percentage, but the count limit governs.
        assert_eq!(
            evaluate(&window(&[U, U, D, D, D]), &thresholds),
            Some(Classification::Normal)
        );
    }

    #[test]
    fn test_partial_when_critical_not_breached() {
        let thresholds = ThresholdConfig {
            critical: 80,
            partial: 40,
            ..Default::default()
        };
        assert_eq!(
            evaluate(&window(&[U, D, D, D, D]), &thresholds),
            Some(Classification::Partial)
        );
    }

    #[test]
    fn test_critical_suppresses_partial() {
        let thresholds = ThresholdConfig {
            critical: 50,
            partial: 10,
            ..Default::default()
        };
        assert_eq!(
            evaluate(&window(&[U, D, D, D, D]), &thresholds),
            Some(Classification::Major)
        );
    }

    #[test]
    fn test_global_never_partial() {
        let thresholds = ThresholdConfig {
            threshold: 50,
            critical: 90,
            partial: 10,
            ..Default::default()
        };
        // 40%: partial would breach, but the global tier is authoritative.
        assert_eq!(
            evaluate(&window(&[U, U, U, D, D]), &thresholds),
            Some(Classification::Normal)
        );
        assert_eq!(
            evaluate(&window(&[U, D, D, D, D]), &thresholds),
            Some(Classification::Major)
        );
    }

    #[test]
    fn test_default_only_fully_down_triggers() {
        let mut thresholds = ThresholdConfig::default();
        thresholds.apply_defaults();
        assert_eq!(thresholds.threshold, 100);

        assert_eq!(thresholds.global(), Some(Tier::FullyDown));
        assert_eq!(
            evaluate(&window(&[U, D, D, D, D]), &thresholds),
            Some(Classification::Normal)
        );
        assert_eq!(
            evaluate(&window(&[D, D, D, D, D]), &thresholds),
            Some(Classification::Major)
        );
    }

    #[test]
    fn test_configured_100_percent_never_triggers() {
        let all_down = window(&[D, D, D, D, D]);
        for mut thresholds in [
            ThresholdConfig {
                threshold: 100,
                ..Default::default()
            },
            ThresholdConfig {
                critical: 100,
                ..Default::default()
            },
        ] {
            thresholds.apply_defaults();
            assert_eq!(
                evaluate(&all_down, &thresholds),
                Some(Classification::Normal),
                "{:?}",
                thresholds
            );
        }
    }

    #[test]
    fn test_defaults_leave_configured_values() {
        let mut thresholds = ThresholdConfig {
            partial_count: 2,
            ..Default::default()
        };
        thresholds.apply_defaults();
        assert_eq!(thresholds.threshold, 0);
        assert_eq!(thresholds.describe(), vec!["Partial threshold: 2 (count)"]);
    }

    #[test]
    fn test_all_up_is_normal() {
        let thresholds = ThresholdConfig {
            threshold_count: 1,
            ..Default::default()
        };
        assert_eq!(
            evaluate(&window(&[U, U, U]), &thresholds),
            Some(Classification::Normal)
        );
    }
}
