use std::time::Duration;
use tokio::time::Instant;

/// Time of the most recent accepted write
#[derive(Debug, Default)]
pub struct ActivityClock {
    last_activity: Option<Instant>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }

    /// True once at least `duration` has passed since the last write.
    /// An unset clock is never quiet.
    pub fn quiet_for(&self, duration: Duration) -> bool {
        self.last_activity
            .is_some_and(|last| last.elapsed() >= duration)
    }

    pub fn reset(&mut self) {
        self.last_activity = None;
    }

    pub fn is_set(&self) -> bool {
        self.last_activity.is_some()
    }
}
