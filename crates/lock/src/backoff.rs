//! Backoff policy for contended lock acquisition.

use std::time::Duration;

/// Bounded exponential backoff between acquisition rounds.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay after the first failed round (default: 10ms).
    pub base_delay: Duration,
    /// Cap applied to every computed delay (default: 1s).
    pub max_delay: Duration,
    /// Growth factor per round (default: 2.0).
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    /// Delay to sleep after the given failed round (1-based).
    #[must_use]
    pub fn delay_for(&self, round: u32) -> Duration {
        let exponent = round.saturating_sub(1);
        let factor = self.multiplier.powi(exponent.min(i32::MAX as u32) as i32);
        let delay_secs = self.base_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn delays_double_per_round() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_for(1), Duration::from_millis(10));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(20));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(40));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(80));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let backoff = Backoff {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(30), Duration::from_millis(500));
    }

    #[test]
    fn huge_round_does_not_overflow() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_for(u32::MAX), backoff.max_delay);
    }
}
