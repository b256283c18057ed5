//! Time-based condition gates
//!
//! A [`TimeSpan`] is a configured threshold whose timer latches lazily: it
//! only starts counting on the first cycle it is checked, not when it was
//! configured. A [`DurationModifier`] wraps a condition's raw boolean with
//! one of the MORE/EQUAL/LESS/WITHIN comparisons.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Unit the configured value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl Default for TimeUnit {
    fn default() -> Self {
        TimeUnit::Seconds
    }
}

/// A configured time threshold with a lazily latched start timestamp.
///
/// The start timestamp is transient and never persisted; a freshly loaded
/// span is always in the reset state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSpan {
    /// Configured value, interpreted per `unit`.
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub unit: TimeUnit,
    #[serde(skip)]
    start: Option<Instant>,
}

impl Default for TimeSpan {
    fn default() -> Self {
        Self {
            value: 0.0,
            unit: TimeUnit::Seconds,
            start: None,
        }
    }
}

impl TimeSpan {
    pub fn from_secs(value: f64) -> Self {
        Self {
            value,
            unit: TimeUnit::Seconds,
            start: None,
        }
    }

    /// Configured threshold in milliseconds.
    pub fn millis(&self) -> u128 {
        let secs = match self.unit {
            TimeUnit::Seconds => self.value,
            TimeUnit::Minutes => self.value * 60.0,
            TimeUnit::Hours => self.value * 3600.0,
        };
        (secs * 1000.0).max(0.0) as u128
    }

    /// Whether the timer has not been latched since the last reset.
    pub fn is_reset(&self) -> bool {
        self.start.is_none()
    }

    /// Clear the latch; the next [`TimeSpan::reached`] call restarts it.
    pub fn reset(&mut self) {
        self.start = None;
    }

    /// Check whether the threshold has elapsed since the latch.
    ///
    /// If the timer is reset, this latches the start to now and reports
    /// false (unless the threshold is zero). The timer therefore counts
    /// from the first check after the underlying condition became true.
    pub fn reached(&mut self) -> bool {
        let start = *self.start.get_or_insert_with(Instant::now);
        start.elapsed().as_millis() >= self.millis()
    }

    /// Elapsed milliseconds since the latch, zero if reset.
    pub fn elapsed_millis(&self) -> u128 {
        self.start.map(|s| s.elapsed().as_millis()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: std::time::Duration) {
        self.start = Some(Instant::now() - by);
    }
}

/// Comparison applied by a [`DurationModifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationCheck {
    /// Passthrough, no time gate.
    None,
    /// True once the condition has held at least this long.
    More,
    /// True exactly once, on the cycle where the threshold is crossed.
    Equal,
    /// True while the condition has held less than this long.
    Less,
    /// Still considered true within this long after going false.
    Within,
}

impl Default for DurationCheck {
    fn default() -> Self {
        DurationCheck::None
    }
}

/// Wraps a condition's raw result with a duration comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DurationModifier {
    #[serde(default)]
    pub check: DurationCheck,
    #[serde(default)]
    pub span: TimeSpan,
    /// EQUAL fires once; this latch suppresses re-firing on later cycles.
    #[serde(skip)]
    was_reached: bool,
}

impl DurationModifier {
    pub fn new(check: DurationCheck, span: TimeSpan) -> Self {
        Self {
            check,
            span,
            was_reached: false,
        }
    }

    /// Apply the duration gate to this cycle's raw condition result.
    ///
    /// All checks except WITHIN restart the timer the moment the raw value
    /// goes false. WITHIN instead restarts it while the raw value is true,
    /// so the window counts down from the moment it goes false.
    pub fn evaluate(&mut self, raw: bool) -> bool {
        match self.check {
            DurationCheck::None => raw,
            DurationCheck::More => {
                if !raw {
                    self.span.reset();
                }
                raw && self.span.reached()
            }
            DurationCheck::Equal => {
                if !raw {
                    self.span.reset();
                    self.was_reached = false;
                    return false;
                }
                if self.span.reached() && !self.was_reached {
                    self.was_reached = true;
                    return true;
                }
                false
            }
            DurationCheck::Less => {
                if !raw {
                    self.span.reset();
                }
                raw && !self.span.reached()
            }
            DurationCheck::Within => {
                if raw {
                    self.span.reset();
                }
                raw || !self.span.reached()
            }
        }
    }

    /// Drop all transient timer state, e.g. when the owning macro is
    /// paused or reloaded.
    pub fn reset(&mut self) {
        self.span.reset();
        self.was_reached = false;
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: std::time::Duration) {
        self.span.backdate(by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn span_latches_on_first_check() {
        let mut span = TimeSpan::from_secs(5.0);
        assert!(span.is_reset());
        // First check latches the start and reports false.
        assert!(!span.reached());
        assert!(!span.is_reset());
        // Simulate 5.1s having passed since the latch.
        span.backdate(Duration::from_millis(5100));
        assert!(span.reached());
    }

    #[test]
    fn span_reset_clears_latch() {
        let mut span = TimeSpan::from_secs(0.01);
        span.backdate(Duration::from_millis(100));
        assert!(span.reached());
        span.reset();
        assert!(span.is_reset());
        assert_eq!(span.elapsed_millis(), 0);
    }

    #[test]
    fn zero_span_is_immediately_reached() {
        let mut span = TimeSpan::from_secs(0.0);
        assert!(span.reached());
    }

    #[test]
    fn unit_conversion() {
        let span = TimeSpan {
            value: 2.0,
            unit: TimeUnit::Minutes,
            start: None,
        };
        assert_eq!(span.millis(), 120_000);
        let span = TimeSpan {
            value: 1.0,
            unit: TimeUnit::Hours,
            start: None,
        };
        assert_eq!(span.millis(), 3_600_000);
    }

    #[test]
    fn more_requires_held_duration() {
        let mut m = DurationModifier::new(DurationCheck::More, TimeSpan::from_secs(1.0));
        assert!(!m.evaluate(true)); // latches
        m.backdate(Duration::from_millis(1100));
        assert!(m.evaluate(true));
        // Going false resets the timer.
        assert!(!m.evaluate(false));
        assert!(!m.evaluate(true));
    }

    #[test]
    fn equal_fires_exactly_once() {
        let mut m = DurationModifier::new(DurationCheck::Equal, TimeSpan::from_secs(1.0));
        assert!(!m.evaluate(true)); // latch, below threshold
        m.backdate(Duration::from_millis(1100));
        // Three consecutive true cycles past the threshold yield one true.
        let fired: Vec<bool> = (0..3).map(|_| m.evaluate(true)).collect();
        assert_eq!(fired, vec![true, false, false]);
        // After a false cycle the latch re-arms.
        assert!(!m.evaluate(false));
        assert!(!m.evaluate(true));
        m.backdate(Duration::from_millis(1100));
        assert!(m.evaluate(true));
    }

    #[test]
    fn less_true_only_below_threshold() {
        let mut m = DurationModifier::new(DurationCheck::Less, TimeSpan::from_secs(1.0));
        assert!(m.evaluate(true));
        m.backdate(Duration::from_millis(1100));
        assert!(!m.evaluate(true));
    }

    #[test]
    fn within_holds_after_falling_edge() {
        let mut m = DurationModifier::new(DurationCheck::Within, TimeSpan::from_secs(1.0));
        assert!(m.evaluate(true));
        // Just went false: still inside the window.
        assert!(m.evaluate(false));
        m.backdate(Duration::from_millis(1100));
        // Window elapsed.
        assert!(!m.evaluate(false));
        // Going true again re-arms the window.
        assert!(m.evaluate(true));
        assert!(m.evaluate(false));
    }

    #[test]
    fn none_is_passthrough() {
        let mut m = DurationModifier::default();
        assert!(m.evaluate(true));
        assert!(!m.evaluate(false));
    }
}
