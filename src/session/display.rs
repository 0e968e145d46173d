use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of "now" for the display gate.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Tests step the display gate with it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decides whether a confirmed gesture is still shown. Evaluated on every
/// frame from `now`; there is no timer behind it.
#[derive(Debug, Clone, Copy)]
pub struct DisplayGate {
    duration: Duration,
}

impl DisplayGate {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn is_open(&self, confirmed_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(confirmed_at) < self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_open_before_duration_and_closed_after() {
        let gate = DisplayGate::new(Duration::from_millis(2500));
        let clock = ManualClock::new();
        let t0 = clock.now();

        clock.advance(Duration::from_millis(2400));
        assert!(gate.is_open(t0, clock.now()));

        clock.advance(Duration::from_millis(200));
        assert!(!gate.is_open(t0, clock.now()));
    }

    #[test]
    fn gate_closes_exactly_at_duration() {
        let gate = DisplayGate::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(!gate.is_open(t0, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn clones_of_manual_clock_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let before = other.now();
        clock.advance(Duration::from_secs(3));
        assert_eq!(other.now() - before, Duration::from_secs(3));
    }
}
