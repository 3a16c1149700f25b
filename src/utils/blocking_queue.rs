//! ## BlockingQueue
//!
//! Unbounded FIFO used between the control loop, the scheduler and the UDP
//! queues. Built on a crossbeam channel, the queue owns both ends so every
//! clone can enqueue and dequeue.

use std::time::Duration;

use crossbeam_channel as cbc;

/// Thread-safe FIFO with blocking, timed and non-blocking dequeue.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    tx: cbc::Sender<T>,
    rx: cbc::Receiver<T>,
}

impl<T> Clone for BlockingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    /// Empty queue.
    pub fn new() -> Self {
        let (tx, rx) = cbc::unbounded();
        Self { tx, rx }
    }

    /// Appends `value` and wakes one waiting consumer.
    pub fn enqueue(&self, value: T) {
        // Both ends live in self, the channel can not be disconnected here
        let _ = self.tx.send(value);
    }

    /// Waits for the oldest element.
    pub fn dequeue(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Waits at most `timeout` for the oldest element.
    pub fn timeout_dequeue(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Oldest element if one is queued, never blocks.
    pub fn try_dequeue(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn fifo_order() {
        let q = BlockingQueue::new();
        for i in 0..5 {
            q.enqueue(i);
        }
        let out: Vec<_> = std::iter::from_fn(|| q.try_dequeue()).collect();
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn try_dequeue_on_empty_is_none() {
        let q: BlockingQueue<u8> = BlockingQueue::new();
        assert!(q.try_dequeue().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn timeout_dequeue_gives_up() {
        let q: BlockingQueue<u8> = BlockingQueue::new();
        let start = Instant::now();
        assert!(q.timeout_dequeue(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn dequeue_wakes_on_enqueue_from_other_thread() {
        let q = BlockingQueue::new();
        {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                q.enqueue(7u32);
            });
        }
        assert_eq!(q.dequeue(), Some(7));
    }

    #[test]
    fn concurrent_producers_deliver_everything() {
        let q = BlockingQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        q.enqueue(p * 100 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let mut seen: Vec<_> = std::iter::from_fn(|| q.try_dequeue()).collect();
        seen.sort();
        assert_eq!(seen, (0..400).collect::<Vec<_>>());
    }
}
