//! Liveness timestamps with a background checker.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Fault;
use crate::utils::now_ms;

/// Last beat of one loop and how late it may get.
#[derive(Debug)]
pub struct HeartBeat {
    last_beat: AtomicI64,
    threshold: Duration,
}

impl HeartBeat {
    /// Heartbeat which counts as beaten right now.
    pub fn new(threshold: Duration) -> Self {
        Self {
            last_beat: AtomicI64::new(now_ms()),
            threshold,
        }
    }

    /// Records a beat.
    pub fn beat(&self) {
        self.last_beat.store(now_ms(), Ordering::Release);
    }

    /// Maximum time between two beats.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    fn delta(&self) -> Duration {
        let last = self.last_beat.load(Ordering::Acquire);
        Duration::from_millis((now_ms() - last).max(0) as u64)
    }

    /// Whether the last beat is within the threshold.
    pub fn check(&self) -> bool {
        self.delta() <= self.threshold
    }

    /// Fails with [Fault::HeartBeat] when the last beat is too old.
    pub fn check_late(&self) -> Result<(), Fault> {
        let delta = self.delta();
        if delta > self.threshold {
            return Err(Fault::HeartBeat {
                delta,
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}

/// Owner of every [HeartBeat] of the node.
///
/// The check period is a tenth of the shortest threshold handed out.
#[derive(Debug)]
pub struct HeartBeatManager {
    beats: Vec<Arc<HeartBeat>>,
    rerun: Duration,
    terminate: Arc<AtomicBool>,
}

impl Default for HeartBeatManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartBeatManager {
    /// Manager without heartbeats.
    pub fn new() -> Self {
        Self {
            beats: Vec::new(),
            rerun: Duration::from_secs(10),
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Hands out a new heartbeat and shortens the check period if needed.
    pub fn get_new(&mut self, threshold: Duration) -> Arc<HeartBeat> {
        self.rerun = self.rerun.min(threshold / 10);
        let beat = Arc::new(HeartBeat::new(threshold));
        self.beats.push(beat.clone());
        beat
    }

    /// Period of the check loop.
    pub fn rerun_time(&self) -> Duration {
        self.rerun
    }

    /// Flag which ends [HeartBeatManager::run_in_this_thread] when set.
    pub fn terminate_flag(&self) -> Arc<AtomicBool> {
        self.terminate.clone()
    }

    /// Checks every heartbeat once.
    pub fn check_all(&self) -> Result<(), Fault> {
        self.beats.iter().try_for_each(|beat| beat.check_late())
    }

    /// Checks every heartbeat each period until terminated or a beat is missed.
    pub fn run_in_this_thread(&self) -> Result<(), Fault> {
        while !self.terminate.load(Ordering::Relaxed) {
            let next = Instant::now() + self.rerun;
            self.check_all()?;
            thread::sleep(next.saturating_duration_since(Instant::now()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn fresh_heartbeat_is_alive() {
        let hb = HeartBeat::new(Duration::from_millis(50));
        assert!(hb.check());
        assert!(hb.check_late().is_ok());
    }

    #[test]
    fn missed_beat_is_fatal() {
        let hb = HeartBeat::new(Duration::from_millis(20));
        sleep(Duration::from_millis(40));
        assert!(!hb.check());
        let err = hb.check_late().unwrap_err();
        assert!(matches!(err, Fault::HeartBeat { .. }));
        assert!(!err.is_recoverable());
        hb.beat();
        assert!(hb.check());
    }

    #[test]
    fn rerun_is_a_tenth_of_the_shortest_threshold() {
        let mut m = HeartBeatManager::new();
        m.get_new(Duration::from_millis(2000));
        m.get_new(Duration::from_millis(500));
        m.get_new(Duration::from_millis(1000));
        assert_eq!(m.rerun_time(), Duration::from_millis(50));
    }

    #[test]
    fn manager_fails_once_a_loop_stops_beating() {
        let mut m = HeartBeatManager::new();
        let alive = m.get_new(Duration::from_millis(100));
        let stuck = m.get_new(Duration::from_millis(100));
        let stop = Arc::new(AtomicBool::new(false));
        let beater = {
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    alive.beat();
                    sleep(Duration::from_millis(5));
                }
            })
        };
        let start = Instant::now();
        let err = m.run_in_this_thread().unwrap_err();
        assert!(matches!(err, Fault::HeartBeat { .. }));
        assert!(start.elapsed() >= Duration::from_millis(100));
        drop(stuck);
        stop.store(true, Ordering::Relaxed);
        beater.join().unwrap();
    }

    #[test]
    fn manager_stops_on_terminate() {
        let mut m = HeartBeatManager::new();
        let hb = m.get_new(Duration::from_millis(1000));
        m.terminate_flag().store(true, Ordering::Relaxed);
        assert!(m.run_in_this_thread().is_ok());
        hb.beat();
    }
}
