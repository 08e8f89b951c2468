//! Retransmission timer.
//!
//! LRCP retransmits on a fixed period with no RTT estimation and no
//! back-off: every [`TimerConfig::retransmit_interval`] each session re-emits
//! its whole unacknowledged tail.  [`RetransmitTimer`] wraps a
//! `tokio::time::Interval` so the session event loop can `select!` on it.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Default period between retransmissions.
pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(2);

/// Adjustable timer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Period of the retransmission tick.
    pub retransmit_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
        }
    }
}

/// A running retransmission tick for one session.
///
/// The first tick fires one full period after creation.  Ticks missed while
/// the session was busy are not replayed in a burst.
#[derive(Debug)]
pub struct RetransmitTimer {
    interval: Interval,
}

impl RetransmitTimer {
    /// Start a timer.  Must be called from within a tokio runtime.
    pub fn start(config: &TimerConfig) -> Self {
        // tokio rejects a zero period.
        let period = config.retransmit_interval.max(Duration::from_millis(1));
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_two_seconds() {
        assert_eq!(TimerConfig::default().retransmit_interval, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn first_tick_waits_one_period() {
        let config = TimerConfig {
            retransmit_interval: Duration::from_millis(50),
        };
        let mut timer = RetransmitTimer::start(&config);
        assert_eq!(timer.period(), Duration::from_millis(50));

        let started = std::time::Instant::now();
        timer.tick().await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
