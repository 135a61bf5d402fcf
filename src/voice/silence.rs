//! Silence-based auto-stop
//!
//! Tracks how long input energy has stayed below a threshold. Any reading
//! above the threshold resets the accumulator.

use std::time::Duration;

/// When a recording should end on its own
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilencePolicy {
    /// RMS level (normalized samples) below which input counts as silence
    pub threshold: f32,

    /// Continuous silence that ends the recording
    pub silence_duration: Duration,

    /// How often the input level is sampled
    pub poll_interval: Duration,

    /// Hard cap on recording length
    pub max_duration: Option<Duration>,
}

impl Default for SilencePolicy {
    fn default() -> Self {
        Self {
            threshold: 0.03,
            silence_duration: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(100),
            max_duration: None,
        }
    }
}

/// Silence accumulator driven by periodic energy readings
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    policy: SilencePolicy,
    silent_for: Duration,
    last_elapsed: Option<Duration>,
}

impl SilenceDetector {
    /// Create a detector for the given policy
    #[must_use]
    pub const fn new(policy: SilencePolicy) -> Self {
        Self {
            policy,
            silent_for: Duration::ZERO,
            last_elapsed: None,
        }
    }

    /// Feed one energy reading taken `elapsed` after capture started
    ///
    /// Returns true once silence has lasted at least the policy's
    /// silence duration.
    pub fn observe(&mut self, energy: f32, elapsed: Duration) -> bool {
        let step = self
            .last_elapsed
            .map_or(Duration::ZERO, |prev| elapsed.saturating_sub(prev));
        self.last_elapsed = Some(elapsed);

        if energy > self.policy.threshold {
            if !self.silent_for.is_zero() {
                tracing::trace!(energy, silent_ms = self.silent_for.as_millis(), "speech resumed");
            }
            self.silent_for = Duration::ZERO;
            return false;
        }

        self.silent_for += step;
        self.silent_for >= self.policy.silence_duration
    }

    /// Continuous silence observed so far
    #[must_use]
    pub const fn silent_for(&self) -> Duration {
        self.silent_for
    }

    /// Clear the accumulator
    pub const fn reset(&mut self) {
        self.silent_for = Duration::ZERO;
        self.last_elapsed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_triggers_after_silence_duration() {
        let mut detector = SilenceDetector::new(SilencePolicy {
            silence_duration: ms(300),
            ..SilencePolicy::default()
        });

        assert!(!detector.observe(0.0, ms(0)));
        assert!(!detector.observe(0.0, ms(100)));
        assert!(!detector.observe(0.0, ms(200)));
        assert!(detector.observe(0.0, ms(300)));
    }

    #[test]
    fn test_speech_resets_accumulator() {
        let mut detector = SilenceDetector::new(SilencePolicy {
            silence_duration: ms(300),
            ..SilencePolicy::default()
        });

        detector.observe(0.0, ms(0));
        detector.observe(0.0, ms(100));
        detector.observe(0.0, ms(200));
        assert!(!detector.observe(0.5, ms(300)));
        assert_eq!(detector.silent_for(), Duration::ZERO);

        assert!(!detector.observe(0.0, ms(400)));
        assert!(!detector.observe(0.0, ms(500)));
        assert_eq!(detector.silent_for(), ms(200));
        // Silence counts from the loud reading at 300 ms
        assert!(detector.observe(0.0, ms(600)));
    }

    #[test]
    fn test_reading_at_threshold_is_silence() {
        let mut detector = SilenceDetector::new(SilencePolicy {
            threshold: 0.1,
            silence_duration: ms(100),
            ..SilencePolicy::default()
        });

        detector.observe(0.1, ms(0));
        assert!(detector.observe(0.1, ms(100)));

        detector.reset();
        assert_eq!(detector.silent_for(), Duration::ZERO);
    }
}
