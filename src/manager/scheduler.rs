//! # Scheduler
//!
//! Merges every car's [StateChange]s into the [GlobalState], republishes the
//! local car's changes to the peers, assigns the hall calls pressed on the
//! local car and makes sure each assignment is served.
//!
//! Two loops share one [Scheduler]:
//! - the ingestion loop ([Scheduler::run_local]) handles incoming state changes
//! - the request checker ([Scheduler::run_request_checker]) resends or
//!   reassigns requests whose deadline passed
//!
//! Commands addressed to the local car or to every car go to the local
//! command queue, commands for any other car go to the remote queue.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config;
use crate::elevio::{Bounds, ButtonType};
use crate::error::Fault;
use crate::supervision::heartbeat::HeartBeat;
use crate::supervision::restart::{spawn_restarting, LoopHandle};
use crate::utils::blocking_queue::BlockingQueue;
use crate::world_view::{ChangeType, Command, CommandType, GlobalState, StateChange};

use super::request_queue::{Request, RequestQueue, RequestType};
use super::task_allocator::{optimal_elevator, Thresholds};

/// Deadlines and limits of the request protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTiming {
    /// Deadline of a freshly sent call
    pub ack_deadline: Duration,
    /// Deadline of a call the target accepted
    pub serve_deadline: Duration,
    /// Resends to the same car before reassigning
    pub repeat_bound: u32,
    /// Staleness limits of the assignment
    pub thresholds: Thresholds,
}

impl Default for RequestTiming {
    fn default() -> Self {
        Self {
            ack_deadline: config::REQUEST_ACK_DEADLINE,
            serve_deadline: config::REQUEST_SERVE_DEADLINE,
            repeat_bound: config::REQUEST_REPEAT_BOUND,
            thresholds: Thresholds::default(),
        }
    }
}

/// Queues connecting the scheduler to the car and to the network.
#[derive(Debug, Clone, Default)]
pub struct SchedulerQueues {
    /// State changes of every car, local ones first land here
    pub state_in: BlockingQueue<StateChange>,
    /// Local state changes to broadcast
    pub state_out: BlockingQueue<StateChange>,
    /// Commands to broadcast
    pub commands_to_remote: BlockingQueue<Command>,
    /// Commands for the local car
    pub commands_to_local: BlockingQueue<Command>,
}

/// Distributed call assignment of one node.
#[derive(Debug, Clone)]
pub struct Scheduler {
    local_id: i32,
    bounds: Bounds,
    global_state: Arc<GlobalState>,
    requests: Arc<RequestQueue>,
    queues: SchedulerQueues,
    timing: RequestTiming,
    terminate: Arc<AtomicBool>,
}

fn lamp_on(button_type: ButtonType) -> CommandType {
    if button_type == ButtonType::UP {
        CommandType::TurnOnLightUp
    } else {
        CommandType::TurnOnLightDown
    }
}

fn call_to(button_type: ButtonType) -> CommandType {
    if button_type == ButtonType::UP {
        CommandType::CallToFloorAndGoUp
    } else {
        CommandType::CallToFloorAndGoDown
    }
}

impl Scheduler {
    /// Scheduler of node `local_id` working on `global_state`.
    pub fn new(
        local_id: i32,
        bounds: Bounds,
        global_state: Arc<GlobalState>,
        queues: SchedulerQueues,
        timing: RequestTiming,
    ) -> Self {
        Self {
            local_id,
            bounds,
            global_state,
            requests: Arc::new(RequestQueue::new()),
            queues,
            timing,
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Outstanding requests of this node.
    pub fn requests(&self) -> &RequestQueue {
        &self.requests
    }

    /// Flag which ends both loops when set.
    pub fn terminate_flag(&self) -> Arc<AtomicBool> {
        self.terminate.clone()
    }

    fn forward_to_targets(&self, command: Command) {
        if command.is_for(self.local_id) {
            self.queues.commands_to_local.enqueue(command);
        }
        if command.target_elevator_id != self.local_id {
            self.queues.commands_to_remote.enqueue(command);
        }
    }

    fn assign(&self, button_type: ButtonType, floor: i32) -> Result<i32, Fault> {
        let cars = self.global_state.elevators_with_age();
        optimal_elevator(&cars, button_type, floor, &self.bounds, &self.timing.thresholds)
    }

    /// Lights the hall lamp everywhere and assigns the call to the best car.
    pub fn handle_button_press(&self, button_type: ButtonType, floor: i32) -> Result<(), Fault> {
        self.forward_to_targets(Command::new(lamp_on(button_type), Command::ANY_ID, floor));
        let target = self.assign(button_type, floor)?;
        info!("hall call {:?} at floor {} assigned to elevator {}", button_type, floor, target);
        let command = Command::new(call_to(button_type), target, floor);
        self.requests
            .push(Request::new(command, self.timing.ack_deadline));
        self.forward_to_targets(command);
        Ok(())
    }

    /// Merges one state change and reacts to it.
    ///
    /// A state which does not fit the floor range is dropped with a recoverable fault.
    pub fn handle_state_change(&self, change: StateChange) -> Result<(), Fault> {
        change.state.assert_consistency(&self.bounds)?;
        self.global_state.update(change.state);
        self.global_state.assert_consistency(&self.bounds)?;
        debug!(
            "state update: id = {}, timestamp = {}, change = {:?}, floor = {}",
            change.state.id, change.state.timestamp, change.change_type, change.change_floor
        );
        let local = change.state.id == self.local_id;
        if local {
            self.queues.state_out.enqueue(change);
        }
        match change.change_type {
            ChangeType::ButtonUpPressed if local => {
                self.handle_button_press(ButtonType::UP, change.change_floor)?
            }
            ChangeType::ButtonDownPressed if local => {
                self.handle_button_press(ButtonType::DOWN, change.change_floor)?
            }
            ChangeType::GoingToServeUp | ChangeType::GoingToServeDown => {
                self.requests
                    .ack_request(&change, self.timing.serve_deadline);
            }
            ChangeType::ServedUp | ChangeType::ServedDown => {
                self.requests.ack_request(&change, Duration::ZERO);
                // every node clears the lamps its own car served
                if local {
                    let lamp_off = if change.change_type == ChangeType::ServedUp {
                        CommandType::TurnOffLightUp
                    } else {
                        CommandType::TurnOffLightDown
                    };
                    self.forward_to_targets(Command::new(lamp_off, Command::ANY_ID, change.change_floor));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Resends an expired request, reassigning it when its car looks stuck.
    pub fn handle_expired(&self, mut request: Request) -> Result<(), Fault> {
        info!(
            "request {:?} at floor {} for elevator {} expired ({:?}, repeated {})",
            request.command.command_type,
            request.trigger_floor(),
            request.elevator_id(),
            request.request_type,
            request.repeated
        );
        request.repeated += 1;
        if request.repeated > self.timing.repeat_bound || request.request_type == RequestType::NotDone {
            let button_type = if request.command.command_type == CommandType::CallToFloorAndGoUp {
                ButtonType::UP
            } else {
                ButtonType::DOWN
            };
            let target = self.assign(button_type, request.trigger_floor())?;
            if target != request.elevator_id() {
                warn!(
                    "reassigning floor {} from elevator {} to {}",
                    request.trigger_floor(),
                    request.elevator_id(),
                    target
                );
            }
            request.command.target_elevator_id = target;
            request.request_type = RequestType::NotAcknowledged;
            request.repeated = 0;
            request.deadline = self.timing.ack_deadline;
        }
        request.update_deadline();
        let command = request.command;
        self.requests.push(request);
        self.forward_to_targets(command);
        Ok(())
    }

    /// Ingestion loop, beats `heartbeat` at least every half threshold.
    pub fn run_local(&self, heartbeat: &HeartBeat) -> Result<(), Fault> {
        while !self.terminate.load(Ordering::Relaxed) {
            if let Some(change) = self.queues.state_in.timeout_dequeue(heartbeat.threshold() / 2) {
                self.handle_state_change(change)?;
            }
            heartbeat.beat();
        }
        Ok(())
    }

    /// Request checker loop, beats `heartbeat` at least every half threshold.
    pub fn run_request_checker(&self, heartbeat: &HeartBeat) -> Result<(), Fault> {
        while !self.terminate.load(Ordering::Relaxed) {
            if let Some(request) = self.requests.wait_for_earliest_deadline(heartbeat.threshold() / 2) {
                self.handle_expired(request)?;
            }
            heartbeat.beat();
        }
        Ok(())
    }

    /// Starts both loops, each under the restart wrapper.
    pub fn run(&self, local: Arc<HeartBeat>, checker: Arc<HeartBeat>) -> io::Result<LoopHandle> {
        let ingest = {
            let scheduler = self.clone();
            spawn_restarting("scheduler", move || scheduler.run_local(&local))?
        };
        let check = {
            let scheduler = self.clone();
            spawn_restarting("request-checker", move || scheduler.run_request_checker(&checker))?
        };
        Ok(LoopHandle::new(self.terminate_flag(), vec![ingest, check]))
    }
}
