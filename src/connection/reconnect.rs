// Reconnection backoff for the output device

use std::time::{Duration, Instant};

/// Exponential backoff between attempts to reopen a lost output port
#[derive(Debug, Clone)]
pub struct ReconnectionStrategy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    current_attempt: u32,
}

impl ReconnectionStrategy {
    pub fn new() -> Self {
        Self::with_limits(10, 1000, 30_000)
    }

    pub fn with_limits(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt: base * 2^attempt, capped
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let factor = 2u64.saturating_pow(self.current_attempt);
        let delay_ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        self.current_attempt += 1;

        Some(Duration::from_millis(delay_ms))
    }

    /// Instant of the next attempt counted from `now`, or None once exhausted
    pub fn next_attempt_at(&mut self, now: Instant) -> Option<Instant> {
        self.next_delay().map(|delay| now + delay)
    }

    /// Reset the attempt counter (after a successful connection)
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

impl Default for ReconnectionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Pause after a full backoff run before starting over
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(30);

/// When the next attempt to reopen the port is due.
///
/// Failed attempts back off exponentially. Once the strategy is exhausted the
/// schedule waits `cooldown` and starts a fresh backoff run, so a device
/// plugged in long after it was lost is still picked up.
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    strategy: ReconnectionStrategy,
    cooldown: Duration,
    next_at: Option<Instant>,
}

impl ReconnectSchedule {
    pub fn new(strategy: ReconnectionStrategy, cooldown: Duration) -> Self {
        Self {
            strategy,
            cooldown,
            next_at: None,
        }
    }

    /// True when an attempt may be made at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_at.is_none_or(|at| now >= at)
    }

    pub fn next_attempt(&self) -> Option<Instant> {
        self.next_at
    }

    /// Attempts made in the current backoff run
    pub fn attempts(&self) -> u32 {
        self.strategy.current_attempt()
    }

    /// The port is open: a later loss retries immediately
    pub fn succeeded(&mut self) {
        self.strategy.reset();
        self.next_at = None;
    }

    /// Record a failed attempt at `now`. Returns true when the backoff run is
    /// exhausted and the cooldown started.
    pub fn failed(&mut self, now: Instant) -> bool {
        match self.strategy.next_attempt_at(now) {
            Some(at) => {
                self.next_at = Some(at);
                false
            }
            None => {
                self.strategy.reset();
                self.next_at = Some(now + self.cooldown);
                true
            }
        }
    }
}

impl Default for ReconnectSchedule {
    fn default() -> Self {
        Self::new(ReconnectionStrategy::new(), RETRY_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let mut strategy = ReconnectionStrategy::new();

        assert_eq!(strategy.next_delay(), Some(Duration::from_millis(1000)));
        assert_eq!(strategy.next_delay(), Some(Duration::from_millis(2000)));
        assert_eq!(strategy.next_delay(), Some(Duration::from_millis(4000)));
        assert_eq!(strategy.next_delay(), Some(Duration::from_millis(8000)));
    }

    #[test]
    fn test_delay_is_capped() {
        let mut strategy = ReconnectionStrategy::with_limits(10, 1000, 5000);
        let delays: Vec<_> = std::iter::from_fn(|| strategy.next_delay()).collect();
        assert_eq!(delays.len(), 10);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(5000)));
        assert_eq!(delays[9], Duration::from_millis(5000));
    }

    #[test]
    fn test_reset() {
        let mut strategy = ReconnectionStrategy::new();

        strategy.next_delay();
        strategy.next_delay();
        assert_eq!(strategy.current_attempt(), 2);

        strategy.reset();
        assert_eq!(strategy.current_attempt(), 0);
        assert_eq!(strategy.next_delay(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_max_attempts() {
        let mut strategy = ReconnectionStrategy::with_limits(3, 10, 100);
        let now = Instant::now();

        assert!(strategy.next_attempt_at(now).is_some());
        assert!(strategy.next_attempt_at(now).is_some());
        assert_eq!(
            strategy.next_attempt_at(now),
            Some(now + Duration::from_millis(40))
        );
        assert!(strategy.next_attempt_at(now).is_none());
        assert!(strategy.next_delay().is_none());
    }

    #[test]
    fn test_schedule_due_immediately_after_loss() {
        let now = Instant::now();
        let schedule = ReconnectSchedule::default();
        assert!(schedule.is_due(now));
        assert!(schedule.next_attempt().is_none());
    }

    #[test]
    fn test_schedule_backs_off_between_failures() {
        let t0 = Instant::now();
        let mut schedule =
            ReconnectSchedule::new(ReconnectionStrategy::with_limits(3, 100, 1000), RETRY_COOLDOWN);

        assert!(!schedule.failed(t0));
        assert!(!schedule.is_due(t0 + Duration::from_millis(99)));
        assert!(schedule.is_due(t0 + Duration::from_millis(100)));

        let t1 = t0 + Duration::from_millis(100);
        assert!(!schedule.failed(t1));
        assert_eq!(schedule.next_attempt(), Some(t1 + Duration::from_millis(200)));
        assert_eq!(schedule.attempts(), 2);
    }

    #[test]
    fn test_schedule_starts_over_after_cooldown() {
        let t0 = Instant::now();
        let cooldown = Duration::from_secs(5);
        let mut schedule =
            ReconnectSchedule::new(ReconnectionStrategy::with_limits(2, 10, 100), cooldown);

        assert!(!schedule.failed(t0));
        assert!(!schedule.failed(t0));
        // Third failure exhausts the run: wait the cooldown, then begin again
        assert!(schedule.failed(t0));
        assert_eq!(schedule.next_attempt(), Some(t0 + cooldown));
        assert!(!schedule.is_due(t0 + cooldown - Duration::from_millis(1)));
        assert!(schedule.is_due(t0 + cooldown));
        assert_eq!(schedule.attempts(), 0);

        let t1 = t0 + cooldown;
        assert!(!schedule.failed(t1));
        assert_eq!(schedule.next_attempt(), Some(t1 + Duration::from_millis(10)));
    }

    #[test]
    fn test_schedule_success_resets() {
        let t0 = Instant::now();
        let mut schedule = ReconnectSchedule::default();
        schedule.failed(t0);
        schedule.failed(t0);
        schedule.succeeded();

        assert_eq!(schedule.attempts(), 0);
        assert!(schedule.is_due(t0));
    }
}
