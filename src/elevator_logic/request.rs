//! Request evaluation and direction decisions of the control loop.
//!
//! Pure functions over a snapshot of the car's [ElevatorState]. Every floor
//! lookup is bounds checked, so they return `Result<_, Fault>`.

use crate::elevio::{Bounds, Button, ButtonType, Direction};
use crate::error::Fault;
use crate::utils::floor_set::FloorSet;
use crate::world_view::{ChangeType, ElevatorState};

/// Every pending request, inside and hall.
pub fn all_buttons(state: &ElevatorState) -> FloorSet {
    state.inside_buttons | state.up_buttons | state.down_buttons
}

/// Whether the car should stop at `floor`.
///
/// - an inside request for the floor always stops the car
/// - moving up: a hall call up here, or nothing above and anything here
/// - moving down: a hall call down here, or nothing below and anything here
/// - idle: anything here at the extreme floors, a hall call here otherwise,
///   unless passengers wait for other floors (the call in the direction the
///   car leaves in is cleared on departure)
pub fn should_stop(state: &ElevatorState, floor: i32, bounds: &Bounds) -> Result<bool, Fault> {
    if state.inside_buttons.get(floor, bounds)? {
        return Ok(true);
    }
    let all = all_buttons(state);
    match state.direction {
        Direction::Up => Ok(state.up_buttons.get(floor, bounds)?
            || (!all.any_higher(floor, bounds)? && all.get(floor, bounds)?)),
        Direction::Down => Ok(state.down_buttons.get(floor, bounds)?
            || (!all.any_lower(floor, bounds)? && all.get(floor, bounds)?)),
        Direction::None => {
            let extreme = floor == bounds.min_floor() || floor == bounds.max_floor();
            Ok(all.get(floor, bounds)? && (extreme || !state.inside_buttons.has_any()))
        }
    }
}

/// Direction with more pending work, counted from the last floor.
///
/// Inside requests are counted when there are any, hall calls otherwise.
/// Ties go up.
pub fn optimal_direction(state: &ElevatorState, bounds: &Bounds) -> Result<Direction, Fault> {
    let mut to_serve = state.inside_buttons;
    if !to_serve.has_any() {
        to_serve |= state.up_buttons;
        to_serve |= state.down_buttons;
    }
    let mut higher = 0;
    let mut lower = 0;
    for floor in bounds.floors() {
        if to_serve.get(floor, bounds)? {
            if floor > state.last_floor {
                higher += 1;
            }
            if floor < state.last_floor {
                lower += 1;
            }
        }
    }
    Ok(if higher >= lower {
        Direction::Up
    } else {
        Direction::Down
    })
}

/// Whether inside requests remain in `direction`.
///
/// Only inside requests count, a hall call must not turn a car that still
/// carries passengers the other way.
pub fn priority_floors_in_direction(
    state: &ElevatorState,
    direction: Direction,
    bounds: &Bounds,
) -> Result<bool, Fault> {
    match direction {
        Direction::Up => state.inside_buttons.any_higher(state.last_floor, bounds),
        Direction::Down => state.inside_buttons.any_lower(state.last_floor, bounds),
        Direction::None => Ok(false),
    }
}

/// Hall button at `floor` matching a travel direction.
pub fn button_by_direction(direction: Direction, floor: i32) -> Option<Button> {
    match direction {
        Direction::Up => Some(Button::new(ButtonType::UP, floor)),
        Direction::Down => Some(Button::new(ButtonType::DOWN, floor)),
        Direction::None => None,
    }
}

/// Change reported for a fresh press of a button of `button_type`.
pub fn change_type_by_button(button_type: ButtonType) -> ChangeType {
    match button_type {
        ButtonType::UP => ChangeType::ButtonUpPressed,
        ButtonType::DOWN => ChangeType::ButtonDownPressed,
        ButtonType::INSIDE => ChangeType::InsideButtonPressed,
    }
}
