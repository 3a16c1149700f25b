//! # Supervision
//!
//! Turns a stuck loop into a process exit and a failed invariant into a loop restart.
//!
//! - [heartbeat]: every long-running loop beats a [heartbeat::HeartBeat] once per
//!   cycle, the [heartbeat::HeartBeatManager] fails with [crate::error::Fault::HeartBeat]
//!   when one of them is late.
//! - [restart]: re-enters a loop after a recoverable fault.
//!
//! A loop that ends with a fatal fault stops beating, so its heartbeat brings
//! the process down through the manager.

pub mod heartbeat;
pub mod restart;
