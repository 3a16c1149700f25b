//! ## Request queue
//!
//! Outstanding call assignments of this node, ordered by deadline. The
//! request checker blocks in [RequestQueue::wait_for_earliest_deadline] until
//! the earliest deadline passes, pushes of a nearer deadline and acks wake it
//! up to recompute what it waits for.
//!
//! A request moves `NotAcknowledged -> NotDone -> Done`, one step per
//! matching [StateChange]. `Done` requests are dropped lazily by the waiter.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::world_view::{ChangeType, Command, CommandType, StateChange};

/// Acknowledgment state of a [Request].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// Sent, the target has not confirmed
    NotAcknowledged,
    /// The target accepted the call but has not served it yet
    NotDone,
    /// Served
    Done,
}

/// A call assignment tracked until it is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Acknowledgment state
    pub request_type: RequestType,
    /// Time allowed until the next check
    pub deadline: Duration,
    deadline_at: Instant,
    /// Resends to the current target since its last ack
    pub repeated: u32,
    /// The call as sent to the target
    pub command: Command,
}

impl Request {
    /// Unacknowledged request due `deadline` from now.
    pub fn new(command: Command, deadline: Duration) -> Self {
        Self {
            request_type: RequestType::NotAcknowledged,
            deadline,
            deadline_at: Instant::now() + deadline,
            repeated: 0,
            command,
        }
    }

    /// Restarts the deadline from now.
    pub fn update_deadline(&mut self) {
        self.deadline_at = Instant::now() + self.deadline;
    }

    /// Replaces the deadline and restarts it from now.
    pub fn set_deadline(&mut self, deadline: Duration) {
        self.deadline = deadline;
        self.update_deadline();
    }

    /// When the request is due.
    pub fn deadline_at(&self) -> Instant {
        self.deadline_at
    }

    /// Car the call is assigned to.
    pub fn elevator_id(&self) -> i32 {
        self.command.target_elevator_id
    }

    /// Change which advances the request from its current state.
    pub fn trigger_type(&self) -> ChangeType {
        let accepted = self.request_type == RequestType::NotAcknowledged;
        match self.command.command_type {
            CommandType::CallToFloorAndGoUp if accepted => ChangeType::GoingToServeUp,
            CommandType::CallToFloorAndGoUp => ChangeType::ServedUp,
            CommandType::CallToFloorAndGoDown if accepted => ChangeType::GoingToServeDown,
            CommandType::CallToFloorAndGoDown => ChangeType::ServedDown,
            _ => ChangeType::None,
        }
    }

    /// Floor of the call.
    pub fn trigger_floor(&self) -> i32 {
        self.command.target_floor
    }

    fn matches(&self, change: &StateChange) -> bool {
        self.elevator_id() == change.state.id
            && self.trigger_type() == change.change_type
            && self.trigger_floor() == change.change_floor
    }
}

/// Deadline-ordered queue of [Request]s shared by the scheduler threads.
#[derive(Debug, Default)]
pub struct RequestQueue {
    queue: Mutex<Vec<Request>>,
    signal: Condvar,
}

fn earliest(queue: &[Request]) -> Option<usize> {
    queue
        .iter()
        .enumerate()
        .min_by_key(|(_, r)| r.deadline_at)
        .map(|(i, _)| i)
}

impl RequestQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Request>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds `request`, waking the waiter if it is the new earliest deadline.
    pub fn push(&self, request: Request) {
        let mut queue = self.lock();
        let nearer = earliest(&queue).map_or(true, |i| request.deadline_at < queue[i].deadline_at);
        queue.push(request);
        if nearer {
            self.signal.notify_all();
        }
    }

    /// Removes and returns the earliest request once its deadline passed.
    ///
    /// Gives up with `None` after `timeout`.
    pub fn wait_for_earliest_deadline(&self, timeout: Duration) -> Option<Request> {
        let limit = Instant::now() + timeout;
        let mut queue = self.lock();
        loop {
            queue.retain(|r| r.request_type != RequestType::Done);
            let now = Instant::now();
            let next = earliest(&queue);
            if let Some(i) = next {
                if queue[i].deadline_at <= now {
                    return Some(queue.swap_remove(i));
                }
            }
            let wake = next.map_or(limit, |i| queue[i].deadline_at.min(limit));
            if wake <= now {
                return None;
            }
            queue = self
                .signal
                .wait_timeout(queue, wake - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Advances every request matching `change` by one state.
    ///
    /// A non-zero `new_deadline` gives the matched requests a fresh deadline,
    /// used to let a car that accepted a call serve it.
    pub fn ack_request(&self, change: &StateChange, new_deadline: Duration) {
        let mut queue = self.lock();
        let mut changed = false;
        for request in queue.iter_mut().filter(|r| r.matches(change)) {
            request.request_type = match request.request_type {
                RequestType::NotAcknowledged => RequestType::NotDone,
                RequestType::NotDone | RequestType::Done => RequestType::Done,
            };
            request.repeated = 0;
            if !new_deadline.is_zero() {
                request.set_deadline(new_deadline);
            }
            changed = true;
        }
        if changed {
            self.signal.notify_all();
        }
    }

    /// Requests not yet dropped, `Done` ones included until the waiter runs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no request is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
