//! Restart wrapper for the node's long-running loops.
//!
//! A loop is a closure returning `Result<T, Fault>`. It is re-entered after
//! every fault the predicate accepts, any other fault is handed back. State the
//! loop must keep across restarts lives outside the closure.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, warn};

use crate::error::Fault;

/// Runs `body` until it succeeds or fails with a fault `restartable` rejects.
pub fn restart_on<T, P, F>(name: &str, restartable: P, mut body: F) -> Result<T, Fault>
where
    P: Fn(&Fault) -> bool,
    F: FnMut() -> Result<T, Fault>,
{
    loop {
        match body() {
            Ok(value) => return Ok(value),
            Err(fault) if restartable(&fault) => {
                warn!("{}: caught {}, restarting", name, fault);
            }
            Err(fault) => return Err(fault),
        }
    }
}

/// [restart_on] restarting on every recoverable fault.
pub fn restart_wrapper<T, F>(name: &str, body: F) -> Result<T, Fault>
where
    F: FnMut() -> Result<T, Fault>,
{
    restart_on(name, Fault::is_recoverable, body)
}

/// Spawns a named thread running `body` under [restart_wrapper].
///
/// A fatal fault is logged and ends the thread. Its heartbeat then goes
/// silent and the heartbeat manager takes the process down.
pub fn spawn_restarting<F>(name: &str, body: F) -> io::Result<JoinHandle<()>>
where
    F: FnMut() -> Result<(), Fault> + Send + 'static,
{
    let thread_name = name.to_string();
    thread::Builder::new().name(name.to_string()).spawn(move || {
        if let Err(fault) = restart_wrapper(&thread_name, body) {
            error!("{}: fatal fault {}, leaving", thread_name, fault);
        }
    })
}

/// Threads of one component sharing a terminate flag.
///
/// Dropping the handle sets the flag and joins the threads, every loop checks
/// the flag once per cycle.
#[derive(Debug)]
pub struct LoopHandle {
    terminate: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl LoopHandle {
    /// Handle over `threads`, stopped through `terminate`.
    pub fn new(terminate: Arc<AtomicBool>, threads: Vec<JoinHandle<()>>) -> Self {
        Self { terminate, threads }
    }

    /// Asks the loops to end and waits for them.
    pub fn terminate(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                error!("a supervised thread panicked");
            }
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}
