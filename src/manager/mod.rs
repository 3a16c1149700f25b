//! # Manager
//!
//! Decides which car serves each hall call and keeps track of it until it is served.
//!
//! ## Overview
//! - [scheduler]: the [scheduler::Scheduler] and its two loops.
//! - [request_queue]: deadlines and acknowledgments of outstanding assignments.
//! - [task_allocator]: scoring of the cars for a call.

pub mod request_queue;
pub mod scheduler;
pub mod task_allocator;

pub use scheduler::{RequestTiming, Scheduler, SchedulerQueues};
