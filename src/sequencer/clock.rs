// Clocks - monotonic time source and the sixteenth-note step clock

use super::timeline::Tempo;
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Monotonic time source, injectable for tests
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }

    pub fn set(&self, now: Instant) {
        self.now.set(now);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Step clock: produces one tick per sixteenth note.
///
/// Ticks are anchored to their scheduled instants (next = previous + period)
/// so wake-up jitter never accumulates. The clock knows nothing about steps.
#[derive(Debug, Clone)]
pub struct TimingClock {
    tempo: Tempo,
    running: bool,
    last_tick: Option<Instant>,
    next_tick: Option<Instant>,
}

impl TimingClock {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            tempo,
            running: false,
            last_tick: None,
            next_tick: None,
        }
    }

    /// Start ticking. The instant `now` counts as the first tick; the next
    /// one is due a full period later. Returns false (and changes nothing)
    /// if the clock is already running.
    pub fn start(&mut self, tempo: Tempo, now: Instant) -> bool {
        if self.running {
            return false;
        }
        self.tempo = tempo;
        self.running = true;
        self.last_tick = Some(now);
        self.next_tick = Some(now + self.period());
        true
    }

    /// Replace the period. While running, the pending tick is rescheduled to
    /// `max(last_tick + new_period, now)`: the gap across the change stays
    /// between the old and the new period, so no tick is doubled or skipped.
    pub fn set_tempo(&mut self, tempo: Tempo, now: Instant) {
        if tempo == self.tempo {
            return;
        }
        self.tempo = tempo;

        if !self.running {
            return;
        }
        let last = self.last_tick.unwrap_or(now);
        self.next_tick = Some((last + self.period()).max(now));
        log::debug!("step clock: tempo {} (next tick rescheduled)", tempo);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.last_tick = None;
        self.next_tick = None;
    }

    /// Fire at most one due tick, returning the instant it is anchored to.
    pub fn poll(&mut self, now: Instant) -> Option<Instant> {
        if !self.running {
            return None;
        }
        let due = self.next_tick?;
        if now < due {
            return None;
        }

        let period = self.period();
        let fired = if now >= due + period {
            // More than a whole period late: play this step now and re-anchor
            log::warn!(
                "step clock: tick late by {:.1} ms, re-anchoring",
                (now - due).as_secs_f64() * 1000.0
            );
            now
        } else {
            due
        };

        self.last_tick = Some(fired);
        self.next_tick = Some(fired + period);
        Some(fired)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn period(&self) -> Duration {
        self.tempo.step_duration()
    }

    pub fn last_tick(&self) -> Option<Instant> {
        self.last_tick
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }
}

impl Default for TimingClock {
    fn default() -> Self {
        Self::new(Tempo::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Poll every millisecond for `span`, collecting tick instants
    fn run(clock: &mut TimingClock, from: Instant, span: Duration) -> Vec<Instant> {
        let mut ticks = Vec::new();
        let mut t = from;
        while t <= from + span {
            if let Some(tick) = clock.poll(t) {
                ticks.push(tick);
            }
            t += Duration::from_millis(1);
        }
        ticks
    }

    #[test]
    fn test_start_is_noop_when_running() {
        let t0 = Instant::now();
        let mut clock = TimingClock::default();

        assert!(clock.start(Tempo::new(120), t0));
        assert!(!clock.start(Tempo::new(60), t0 + Duration::from_millis(10)));
        assert_eq!(clock.tempo().bpm(), 120);
        assert_eq!(clock.next_tick(), Some(t0 + Duration::from_millis(125)));
    }

    #[test]
    fn test_ticks_are_evenly_spaced() {
        let t0 = Instant::now();
        let mut clock = TimingClock::default();
        clock.start(Tempo::new(120), t0);

        let ticks = run(&mut clock, t0, Duration::from_millis(1000));
        assert_eq!(ticks.len(), 8);
        for (i, tick) in ticks.iter().enumerate() {
            assert_eq!(*tick, t0 + Duration::from_millis(125 * (i as u64 + 1)));
        }
    }

    #[test]
    fn test_no_drift_with_coarse_polling() {
        let t0 = Instant::now();
        let mut clock = TimingClock::default();
        clock.start(Tempo::new(150), t0); // 100 ms steps

        // Wake up late by 7 ms every time
        let mut ticks = Vec::new();
        let mut t = t0;
        for _ in 0..50 {
            t += Duration::from_millis(100);
            if let Some(tick) = clock.poll(t + Duration::from_millis(7)) {
                ticks.push(tick);
            }
        }
        assert_eq!(ticks.len(), 50);
        assert_eq!(*ticks.last().unwrap(), t0 + Duration::from_millis(5000));
    }

    #[test]
    fn test_one_tick_per_poll() {
        let t0 = Instant::now();
        let mut clock = TimingClock::default();
        clock.start(Tempo::new(120), t0);

        let late = t0 + Duration::from_millis(130);
        assert!(clock.poll(late).is_some());
        assert!(clock.poll(late).is_none());
    }

    #[test]
    fn test_far_behind_reanchors_to_now() {
        let t0 = Instant::now();
        let mut clock = TimingClock::default();
        clock.start(Tempo::new(120), t0);

        let stalled = t0 + Duration::from_millis(600);
        assert_eq!(clock.poll(stalled), Some(stalled));
        assert_eq!(clock.next_tick(), Some(stalled + Duration::from_millis(125)));
    }

    #[test]
    fn test_tempo_increase_does_not_double_fire() {
        let t0 = Instant::now();
        let mut clock = TimingClock::default();
        clock.start(Tempo::new(60), t0); // 250 ms

        let mut ticks = run(&mut clock, t0, Duration::from_millis(500));
        assert_eq!(ticks.len(), 2);

        // Change tempo 240 ms after the last tick: new period is 50 ms
        let change = t0 + Duration::from_millis(740);
        clock.set_tempo(Tempo::new(300), change);
        assert_eq!(clock.next_tick(), Some(change));

        ticks.extend(run(&mut clock, change, Duration::from_millis(500)));
        let gaps: Vec<Duration> = ticks.windows(2).map(|w| w[1] - w[0]).collect();

        // Transition gap is within [new, old]; after that ticks follow the new period
        assert_eq!(gaps[0], Duration::from_millis(250));
        assert_eq!(gaps[1], Duration::from_millis(240));
        assert!(gaps[2..].iter().all(|g| *g == Duration::from_millis(50)));
    }

    #[test]
    fn test_tempo_decrease_stretches_next_tick() {
        let t0 = Instant::now();
        let mut clock = TimingClock::default();
        clock.start(Tempo::new(120), t0);

        clock.set_tempo(Tempo::new(60), t0 + Duration::from_millis(100));
        assert_eq!(clock.next_tick(), Some(t0 + Duration::from_millis(250)));
        assert!(clock.poll(t0 + Duration::from_millis(125)).is_none());
        assert_eq!(
            clock.poll(t0 + Duration::from_millis(250)),
            Some(t0 + Duration::from_millis(250))
        );
    }

    #[test]
    fn test_stop_cancels_schedule() {
        let t0 = Instant::now();
        let mut clock = TimingClock::default();
        clock.start(Tempo::new(120), t0);
        clock.stop();

        assert!(!clock.is_running());
        assert!(clock.poll(t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_manual_clock_advances() {
        let t0 = Instant::now();
        let clock = ManualClock::new(t0);
        clock.advance(Duration::from_millis(16));
        assert_eq!(clock.now(), t0 + Duration::from_millis(16));
    }
}
