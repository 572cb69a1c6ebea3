use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_SCAN_THROTTLE: Duration = Duration::from_millis(3000);

/// Drops decodes that arrive too soon after the last accepted one. The same
/// code sitting in front of the camera gets decoded several times a second.
#[derive(Debug, Clone)]
pub struct DecodeThrottle {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl DecodeThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    pub fn allows(&self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) => now.saturating_duration_since(last) >= self.window,
            None => true,
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.last_accepted = Some(now);
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

impl Default for DecodeThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_THROTTLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn blocks_inside_the_window_and_allows_after() {
        let mut throttle = DecodeThrottle::default();
        let start = Instant::now();
        assert!(throttle.allows(start));
        throttle.record(start);

        assert!(!throttle.allows(start + Duration::from_millis(1000)));
        assert!(!throttle.allows(start + Duration::from_millis(2999)));
        assert!(throttle.allows(start + Duration::from_millis(3000)));

        throttle.reset();
        assert!(throttle.allows(start + Duration::from_millis(1)));
    }
}
