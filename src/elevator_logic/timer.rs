//! One-shot timer polled by the control loop, used for the door wait.

use std::time::{Duration, Instant};

/// Timer which reports a timeout once started and expired.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    timer_active: bool,
    timeout_duration: Duration,
    start_time: Instant,
}

/// Stopped timer expiring `timeout_duration` after it is started.
pub fn new(timeout_duration: Duration) -> Timer {
    Timer {
        timer_active: false,
        timeout_duration,
        start_time: Instant::now(),
    }
}

impl Timer {
    /// Starts (or restarts) the timer.
    pub fn timer_start(&mut self) {
        self.timer_active = true;
        self.start_time = Instant::now();
    }

    /// Stops the timer, it no longer times out.
    pub fn timer_stop(&mut self) {
        self.timer_active = false;
    }

    /// Whether the timer runs and has expired.
    pub fn timer_timeouted(&self) -> bool {
        self.timer_active && self.start_time.elapsed() > self.timeout_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn only_a_started_timer_times_out() {
        let mut t = new(Duration::from_millis(10));
        sleep(Duration::from_millis(20));
        assert!(!t.timer_timeouted());
        t.timer_start();
        assert!(!t.timer_timeouted());
        sleep(Duration::from_millis(20));
        assert!(t.timer_timeouted());
        t.timer_stop();
        assert!(!t.timer_timeouted());
    }
}
