use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Wall-clock time derived from the tokio clock.
///
/// The clock is anchored to `Utc::now()` once and then advances with
/// `tokio::time::Instant`, so timers and timestamps share one notion of time.
/// Under a paused tokio runtime both move together in virtual time.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    anchor: DateTime<Utc>,
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(anchor: DateTime<Utc>) -> Self {
        Clock {
            anchor,
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap_or(TimeDelta::zero());
        self.anchor + elapsed
    }

    /// Time left until `at`, zero when it already passed.
    pub fn until(&self, at: DateTime<Utc>) -> std::time::Duration {
        (at - self.now()).to_std().unwrap_or_default()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
