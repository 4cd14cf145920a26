//! Deadline primitives driven by an injected clock, so the debounce, idle and
//! countdown logic can be tested without sleeping.

use chrono::{DateTime, Duration, Utc};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Trailing-edge debounce: every `arm` restarts the window, `fire` reports
/// true exactly once when the window elapses with no further arming.
#[derive(Debug)]
pub struct Debounce {
    window: Duration,
    deadline: Option<DateTime<Utc>>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Start (or restart) the window from `now`.
    pub fn arm(&mut self, now: DateTime<Utc>) {
        self.deadline = Some(now + self.window);
    }

    /// Abandon a pending deadline without firing.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True once the armed window has elapsed; disarms on firing.
    pub fn fire(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fires_once_after_window() {
        let mut debounce = Debounce::new(Duration::milliseconds(200));
        let start = t0();
        debounce.arm(start);

        assert!(!debounce.fire(start + Duration::milliseconds(100)));
        assert!(debounce.fire(start + Duration::milliseconds(200)));
        // disarmed after firing
        assert!(!debounce.fire(start + Duration::milliseconds(400)));
        assert!(!debounce.is_armed());
    }

    #[test]
    fn test_rearm_restarts_window() {
        let mut debounce = Debounce::new(Duration::milliseconds(200));
        let start = t0();
        debounce.arm(start);
        debounce.arm(start + Duration::milliseconds(150));

        // the original deadline has passed but the window was restarted
        assert!(!debounce.fire(start + Duration::milliseconds(200)));
        assert!(debounce.fire(start + Duration::milliseconds(350)));
    }

    #[test]
    fn test_cancel_abandons_deadline() {
        let mut debounce = Debounce::new(Duration::milliseconds(200));
        let start = t0();
        debounce.arm(start);
        debounce.cancel();
        assert!(!debounce.fire(start + Duration::seconds(10)));
    }

    #[test]
    fn test_unarmed_never_fires() {
        let mut debounce = Debounce::new(Duration::milliseconds(200));
        assert!(!debounce.fire(t0()));
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
