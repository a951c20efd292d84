//! Time source and the fixed cycle cadence.

use std::time::{Duration, Instant};

pub trait Clock {
    /// Time since the clock was created.
    fn elapsed(&self) -> Duration;
    /// Block for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// Wall-clock time via `Instant` and a blocking thread sleep.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Simulated time. Sleeping advances it instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock {
    now: Duration,
    slept: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without sleeping, e.g. to model a slow cycle.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Total time spent in `sleep`.
    pub fn slept(&self) -> Duration {
        self.slept
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
        self.slept += duration;
    }
}

/// Start-to-start scheduler.
///
/// Each cycle starts no earlier than one period after the previous start.
/// A cycle that overruns its period starts the next one immediately and
/// re-anchors the schedule there, so late cycles never bunch up.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    next_start: Option<Duration>,
    overruns: u64,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_start: None,
            overruns: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Sleep until the next slot and return the cycle's start time.
    pub fn wait<K: Clock + ?Sized>(&mut self, clock: &mut K) -> Duration {
        let now = clock.elapsed();
        let start = match self.next_start {
            Some(due) if due > now => {
                clock.sleep(due - now);
                clock.elapsed()
            }
            Some(due) => {
                if now > due {
                    self.overruns += 1;
                    tracing::debug!(late_ms = (now - due).as_millis() as u64, "cycle overran its period");
                }
                now
            }
            None => now,
        };
        self.next_start = Some(start + self.period);
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_millis(1000);

    #[test]
    fn test_first_cycle_starts_immediately() {
        let mut clock = ManualClock::new();
        let mut cadence = Cadence::new(SECOND);
        assert_eq!(cadence.wait(&mut clock), Duration::ZERO);
        assert_eq!(clock.slept(), Duration::ZERO);
    }

    #[test]
    fn test_start_to_start_spacing() {
        let mut clock = ManualClock::new();
        let mut cadence = Cadence::new(SECOND);
        let a = cadence.wait(&mut clock);
        clock.advance(Duration::from_millis(300));
        let b = cadence.wait(&mut clock);
        assert_eq!(b - a, SECOND);
        // Only the remainder of the period is slept.
        assert_eq!(clock.slept(), Duration::from_millis(700));
    }

    #[test]
    fn test_overrun_reanchors() {
        let mut clock = ManualClock::new();
        let mut cadence = Cadence::new(SECOND);
        cadence.wait(&mut clock);
        clock.advance(Duration::from_millis(2500));
        let late = cadence.wait(&mut clock);
        assert_eq!(late, Duration::from_millis(2500));
        assert_eq!(cadence.overruns(), 1);
        let next = cadence.wait(&mut clock);
        assert_eq!(next - late, SECOND);
    }
}
