//! # World view
//!
//! The data every node keeps about the cluster, and the two message bodies
//! the nodes exchange.
//!
//! ## Overview
//! - [`ElevatorState`]: snapshot of one car, owned and mutated only by that car's control loop.
//! - [`StateChange`]: an [ElevatorState] plus what changed, emitted by the control loop.
//! - [`Command`]: an order from a scheduler to one car or to every car.
//! - [`GlobalState`]: the latest [ElevatorState] of every known car, the scheduler's working set.
//!
//! All of them derive `serde` so they can travel in a [crate::network::packet::Packet].

pub mod global_state;

pub use global_state::GlobalState;

use serde::{Deserialize, Serialize};

use crate::elevio::{Bounds, ButtonType, Direction};
use crate::error::Fault;
use crate::fault_unless;
use crate::utils::floor_set::FloorSet;

/// What a [StateChange] reports.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChangeType {
    /// Nothing happened
    #[default]
    None,
    /// Periodic refresh, the state did not change
    KeepAlive,
    /// Button on the car panel pressed
    InsideButtonPressed,
    /// Hall button down pressed at the floor
    ButtonDownPressed,
    /// Hall button up pressed at the floor
    ButtonUpPressed,
    /// The car accepted a call up at the floor
    GoingToServeUp,
    /// The car accepted a call down at the floor
    GoingToServeDown,
    /// The car stopped and opened the doors at the floor
    Served,
    /// The call up at the floor was served
    ServedUp,
    /// The call down at the floor was served
    ServedDown,
    /// Floor, direction or stop state changed
    OtherChange,
}

/// Snapshot of one car.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElevatorState {
    /// Node id of the car
    pub id: i32,
    /// Node-local milliseconds of the last update, see [crate::utils::now_ms]
    pub timestamp: i64,
    /// Last floor the sensor reported
    pub last_floor: i32,
    /// Travel direction
    pub direction: Direction,
    /// The stop button is engaged
    pub stopped: bool,
    /// The doors are open
    pub door_open: bool,
    /// Floors requested from the car panel
    pub inside_buttons: FloorSet,
    /// Hall calls up this car is to serve
    pub up_buttons: FloorSet,
    /// Hall calls down this car is to serve
    pub down_buttons: FloorSet,
}

impl ElevatorState {
    /// Fresh state of car `id` parked at the lowest floor.
    pub fn new(id: i32, bounds: &Bounds) -> Self {
        Self {
            id,
            timestamp: 0,
            last_floor: bounds.min_floor(),
            direction: Direction::None,
            stopped: false,
            door_open: false,
            inside_buttons: FloorSet::new(),
            up_buttons: FloorSet::new(),
            down_buttons: FloorSet::new(),
        }
    }

    /// Hall calls of one direction, `INSIDE` gives the panel requests.
    pub fn buttons(&self, button_type: ButtonType) -> &FloorSet {
        match button_type {
            ButtonType::UP => &self.up_buttons,
            ButtonType::DOWN => &self.down_buttons,
            ButtonType::INSIDE => &self.inside_buttons,
        }
    }

    /// Mutable variant of [ElevatorState::buttons].
    pub fn buttons_mut(&mut self, button_type: ButtonType) -> &mut FloorSet {
        match button_type {
            ButtonType::UP => &mut self.up_buttons,
            ButtonType::DOWN => &mut self.down_buttons,
            ButtonType::INSIDE => &mut self.inside_buttons,
        }
    }

    /// Checks the state against the floor range of the car.
    pub fn assert_consistency(&self, bounds: &Bounds) -> Result<(), Fault> {
        fault_unless!(self.id >= 0, "invalid elevator id");
        fault_unless!(self.inside_buttons.consistent(bounds), "invalid floor set");
        fault_unless!(self.up_buttons.consistent(bounds), "invalid floor set");
        fault_unless!(self.down_buttons.consistent(bounds), "invalid floor set");
        fault_unless!(bounds.contains(self.last_floor), "invalid last floor");
        Ok(())
    }
}

/// A change of one car, as emitted by its control loop.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// What happened
    pub change_type: ChangeType,
    /// Floor it happened at
    pub change_floor: i32,
    /// The car right after the change
    pub state: ElevatorState,
}

impl StateChange {
    /// Change of `change_type` at `change_floor`.
    pub fn new(change_type: ChangeType, change_floor: i32, state: ElevatorState) -> Self {
        Self {
            change_type,
            change_floor,
            state,
        }
    }
}

/// What a [Command] asks the car to do.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandType {
    /// No operation
    #[default]
    Empty,
    /// Serve a call up at the floor
    CallToFloorAndGoUp,
    /// Serve a call down at the floor
    CallToFloorAndGoDown,
    /// Light the up lamp at the floor
    TurnOnLightUp,
    /// Clear the up lamp at the floor
    TurnOffLightUp,
    /// Light the down lamp at the floor
    TurnOnLightDown,
    /// Clear the down lamp at the floor
    TurnOffLightDown,
}

/// Order from a scheduler.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// What to do
    pub command_type: CommandType,
    /// Car to do it, [Command::ANY_ID] for every car
    pub target_elevator_id: i32,
    /// Floor to do it at
    pub target_floor: i32,
}

impl Command {
    /// Id of no car
    pub const NO_ID: i32 = i32::MIN;
    /// Id addressing every car
    pub const ANY_ID: i32 = i32::MAX;

    /// Command of `command_type` for `target_elevator_id` at `target_floor`.
    pub fn new(command_type: CommandType, target_elevator_id: i32, target_floor: i32) -> Self {
        Self {
            command_type,
            target_elevator_id,
            target_floor,
        }
    }

    /// Whether car `id` has to apply this command.
    pub fn is_for(&self, id: i32) -> bool {
        self.target_elevator_id == Self::ANY_ID || self.target_elevator_id == id
    }
}

impl Default for Command {
    fn default() -> Self {
        Self::new(CommandType::Empty, Self::NO_ID, Self::NO_ID)
    }
}
