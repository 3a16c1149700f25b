//! ## GlobalState
//!
//! Latest known [ElevatorState] of every car, keyed by id, plus the union of
//! all hall calls. Written by the scheduler's ingestion loop, read by the
//! assignment algorithm, the session responder and the status printer. All
//! access goes through one mutex.
//!
//! Alongside every state the local [Instant] it arrived at is kept. Peer
//! timestamps come from other clocks, so staleness is measured on arrival.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::elevio::Bounds;
use crate::error::Fault;
use crate::fault_unless;
use crate::utils::floor_set::FloorSet;

use super::ElevatorState;

#[derive(Debug, Default)]
struct Inner {
    elevators: HashMap<i32, (ElevatorState, Instant)>,
    up_buttons: FloorSet,
    down_buttons: FloorSet,
}

impl Inner {
    fn update_buttons(&mut self) {
        self.up_buttons.reset();
        self.down_buttons.reset();
        for (state, _) in self.elevators.values() {
            self.up_buttons |= state.up_buttons;
            self.down_buttons |= state.down_buttons;
        }
    }
}

/// Cluster view shared between the node's threads.
#[derive(Debug, Default)]
pub struct GlobalState {
    inner: Mutex<Inner>,
}

impl GlobalState {
    /// Empty view.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `state` as the latest of its car.
    pub fn update(&self, state: ElevatorState) {
        let mut inner = self.lock();
        inner.elevators.insert(state.id, (state, Instant::now()));
        inner.update_buttons();
    }

    /// Union of the up calls of every car.
    pub fn up_buttons(&self) -> FloorSet {
        self.lock().up_buttons
    }

    /// Union of the down calls of every car.
    pub fn down_buttons(&self) -> FloorSet {
        self.lock().down_buttons
    }

    /// Every known state with the time since it arrived, ordered by id.
    pub fn elevators_with_age(&self) -> Vec<(ElevatorState, Duration)> {
        let inner = self.lock();
        let mut all: Vec<_> = inner
            .elevators
            .values()
            .map(|(state, at)| (*state, at.elapsed()))
            .collect();
        all.sort_by_key(|(state, _)| state.id);
        all
    }

    /// Whether a state of car `id` is known.
    pub fn has(&self, id: i32) -> bool {
        self.lock().elevators.contains_key(&id)
    }

    /// Latest state of car `id`.
    pub fn get(&self, id: i32) -> Option<ElevatorState> {
        self.lock().elevators.get(&id).map(|(state, _)| *state)
    }

    /// Number of known cars.
    pub fn len(&self) -> usize {
        self.lock().elevators.len()
    }

    /// Whether no car is known.
    pub fn is_empty(&self) -> bool {
        self.lock().elevators.is_empty()
    }

    /// Checks the merged calls and every state against `bounds`.
    pub fn assert_consistency(&self, bounds: &Bounds) -> Result<(), Fault> {
        let inner = self.lock();
        fault_unless!(inner.up_buttons.consistent(bounds), "consistency check failed");
        fault_unless!(inner.down_buttons.consistent(bounds), "consistency check failed");
        for (state, _) in inner.elevators.values() {
            state.assert_consistency(bounds)?;
        }
        Ok(())
    }
}
