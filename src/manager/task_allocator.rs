//! # Optimal elevator for a hall call
//!
//! Every scheduler computes the assignment on its own from its
//! [GlobalState](crate::world_view::GlobalState); there is no coordinator.
//!
//! ## Score
//! Lower is better. With `span = max_floor - min_floor`:
//! - distance between the car's last floor and the call
//! - `10 * span` if the car's stop button is engaged
//! - `span + 1` if the car is aligned: moving in the call's direction with the
//!   call ahead, or idle with the call here or in the call's direction
//! - else `3 * (span + 1) / 2` if the car is moving towards the end floor the call is at
//! - else `2 * (span + 1)`
//! - `span` if the car's state is older than [config::OUTDATED_THRESHOLD]
//!
//! Cars older than [config::DEAD_THRESHOLD] are skipped. Ties go to the lowest id.

use std::time::Duration;

use crate::config;
use crate::elevio::{Bounds, ButtonType, Direction};
use crate::error::Fault;
use crate::world_view::ElevatorState;

/// Staleness limits used when scoring cars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Older states are skipped
    pub dead: Duration,
    /// Older states are penalised
    pub outdated: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            dead: config::DEAD_THRESHOLD,
            outdated: config::OUTDATED_THRESHOLD,
        }
    }
}

fn is_aligned(state: &ElevatorState, call: ButtonType, floor: i32) -> bool {
    let ahead_up = call == ButtonType::UP && floor > state.last_floor;
    let ahead_down = call == ButtonType::DOWN && floor < state.last_floor;
    match state.direction {
        Direction::Up => ahead_up,
        Direction::Down => ahead_down,
        Direction::None => floor == state.last_floor || ahead_up || ahead_down,
    }
}

fn towards_end_floor(state: &ElevatorState, floor: i32, bounds: &Bounds) -> bool {
    (state.direction == Direction::Up && floor == bounds.max_floor())
        || (state.direction == Direction::Down && floor == bounds.min_floor())
}

/// Score of one car for a `call` at `floor`, `age` is the time since its state arrived.
pub fn score(
    state: &ElevatorState,
    age: Duration,
    call: ButtonType,
    floor: i32,
    bounds: &Bounds,
    thresholds: &Thresholds,
) -> i64 {
    let span = (bounds.max_floor() - bounds.min_floor()) as i64;
    let mut dist = (state.last_floor as i64 - floor as i64).abs();
    if state.stopped {
        dist += 10 * span;
    }
    dist += if is_aligned(state, call, floor) {
        span + 1
    } else if towards_end_floor(state, floor, bounds) {
        (span + 1) * 3 / 2
    } else {
        2 * (span + 1)
    };
    if age > thresholds.outdated {
        dist += span;
    }
    dist
}

/// Id of the car which should serve a `call` at `floor`.
///
/// ## Parameters
/// - `cars`: every known state with the time since it arrived
///
/// ## Returns
/// The lowest scoring live car, [Fault::NoLiveElevator] when every car is dead.
pub fn optimal_elevator(
    cars: &[(ElevatorState, Duration)],
    call: ButtonType,
    floor: i32,
    bounds: &Bounds,
    thresholds: &Thresholds,
) -> Result<i32, Fault> {
    cars.iter()
        .filter(|(_, age)| *age <= thresholds.dead)
        .map(|(state, age)| (score(state, *age, call, floor, bounds, thresholds), state.id))
        .min()
        .map(|(_, id)| id)
        .ok_or(Fault::NoLiveElevator { floor })
}
