use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Time of the most recent stream chunk.
#[derive(Debug)]
pub struct ActivityClock {
    last: Mutex<Instant>,
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityClock {
    /// A clock stamped at creation time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    /// Records activity now, overwriting the previous stamp.
    pub fn stamp(&self) {
        self.stamp_at(Instant::now());
    }

    pub fn stamp_at(&self, instant: Instant) {
        *self.lock() = instant;
    }

    #[must_use]
    pub fn last(&self) -> Instant {
        *self.lock()
    }

    /// Time between the last stamp and `now`; zero if `now` is earlier.
    #[must_use]
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Instant> {
        match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_overwrites_previous_activity() {
        let clock = ActivityClock::new();
        let base = Instant::now();
        clock.stamp_at(base);
        let later = base + Duration::from_millis(1500);
        assert_eq!(clock.elapsed_at(later), Duration::from_millis(1500));

        clock.stamp_at(base + Duration::from_millis(1000));
        assert_eq!(clock.elapsed_at(later), Duration::from_millis(500));
    }

    #[test]
    fn elapsed_before_the_stamp_is_zero() {
        let clock = ActivityClock::new();
        let base = Instant::now();
        clock.stamp_at(base + Duration::from_secs(5));
        assert_eq!(clock.elapsed_at(base), Duration::ZERO);
    }
}
