//! Small building blocks shared by the control loop, the scheduler and the network layer.
//!
//! - [floor_set]: bitset of floors over the car's floor range
//! - [blocking_queue]: FIFO between threads with blocking, timed and non-blocking dequeue
//! - [now_ms]: node-local monotonic millisecond clock

pub mod blocking_queue;
pub mod floor_set;

use once_cell::sync::Lazy;
use std::time::Instant;

/// Reference point of the node-local clock.
static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds since this process started.
///
/// Monotonic and node-local, timestamps from different nodes are never compared.
pub fn now_ms() -> i64 {
    PROCESS_START.elapsed().as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn clock_is_monotonic() {
        let a = now_ms();
        sleep(Duration::from_millis(5));
        let b = now_ms();
        assert!(b >= a + 5);
    }
}
