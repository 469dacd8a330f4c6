use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of "current time" for deadline decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and scripted simulation.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock by `by` and return the new time. Out of range leaves
    /// the clock where it was and returns `None`.
    pub fn advance(&self, by: Duration) -> Option<DateTime<Utc>> {
        let mut now = self.now.lock();
        let next = now.checked_add_signed(by)?;
        *now = next;
        Some(next)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_told() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        let moved = clock.advance(Duration::seconds(5));
        assert_eq!(moved, Some(start + Duration::seconds(5)));
        assert_eq!(clock.now(), start + Duration::seconds(5));
    }

    #[test]
    fn advance_out_of_range_leaves_clock_unchanged() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.advance(Duration::MAX), None);
        assert_eq!(clock.now(), start);
    }
}
