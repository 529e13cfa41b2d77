//! Time-based coalescing for refreshes and frame work
//!
//! Both schedulers are driven by explicit `now` values so the manager stays
//! synchronous; the caller decides where time comes from.

use std::time::Duration;

use tokio::time::Instant;

/// Trailing-edge debounce: fires once, `delay` after the last `schedule`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    due: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, due: None }
    }

    /// (Re)start the timer.
    pub fn schedule(&mut self, now: Instant) {
        self.due = Some(now + self.delay);
    }

    /// True exactly once when the timer has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.due
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }
}

/// At most one pending unit of work per frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameScheduler {
    pending: bool,
}

impl FrameScheduler {
    /// Returns false when a frame is already requested.
    pub fn request(&mut self) -> bool {
        !std::mem::replace(&mut self.pending, true)
    }

    /// Take the pending request, if any.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_fires_once_after_last_schedule() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(24));

        d.schedule(t0);
        d.schedule(t0 + Duration::from_millis(20));
        assert!(!d.poll(t0 + Duration::from_millis(30)));
        assert!(d.poll(t0 + Duration::from_millis(44)));
        assert!(!d.poll(t0 + Duration::from_millis(100)));
        assert!(!d.is_pending());
    }

    #[test]
    fn cancel_drops_pending_fire() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(16));
        d.schedule(t0);
        d.cancel();
        assert!(!d.poll(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn frames_coalesce() {
        let mut f = FrameScheduler::default();
        assert!(f.request());
        assert!(!f.request());
        assert!(f.take());
        assert!(!f.take());
        assert!(f.request());
    }
}
