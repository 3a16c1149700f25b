//! # Elevator logic
//!
//! Runs the local car.
//!
//! ## Overview
//! - [fsm]: the [fsm::Elevator] and its control loop state machine.
//! - [request]: stateless helpers deciding when to stop and where to go.
//! - [timer]: the door timer.
//!
//! The control loop reads [crate::world_view::Command]s from the scheduler and reports every
//! change of the car as a [crate::world_view::StateChange]. It beats its
//! heartbeat once per cycle and is restarted after a recoverable fault, the
//! car's [crate::world_view::ElevatorState] is kept across restarts.

pub mod fsm;
pub mod request;
pub mod timer;

use std::io;
use std::sync::Arc;

use crate::supervision::heartbeat::HeartBeat;
use crate::supervision::restart::{spawn_restarting, LoopHandle};

pub use fsm::Elevator;

/// Starts the control loop of `elevator` on its own thread.
///
/// ## Returns
/// A [LoopHandle] which terminates and joins the loop when dropped.
pub fn run_local_elevator(mut elevator: Elevator, heartbeat: Arc<HeartBeat>) -> io::Result<LoopHandle> {
    let terminate = elevator.terminate_flag();
    let thread = spawn_restarting("elevator", move || elevator.control_loop(&heartbeat))?;
    Ok(LoopHandle::new(terminate, vec![thread]))
}
