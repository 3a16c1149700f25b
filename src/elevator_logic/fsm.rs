//! # Control loop of the local car
//!
//! [Elevator] owns the car's [ElevatorState]. The state lives in the struct,
//! not in the loop, so it survives a restart of the loop after a recoverable
//! fault. Everything else the loop needs (phase, button edges, door timer) is
//! rebuilt on every (re)start in [LoopState].
//!
//! ## Cycle
//! 1. poll buttons, light fresh presses and report them
//! 2. stop button edge: stop the car or resume in the remembered direction
//! 3. obstruction: shut the car down and stop beating until it clears
//! 4. apply at most one [Command]
//! 5. read the floor sensor, apply the end-of-shaft clamps, report floor changes
//! 6. run the phase logic (`Normal`, `WaitingForInButton`, `Stopped`)
//! 7. keep-alive, then the caller beats the heartbeat

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::{self, ElevatorTiming};
use crate::elevio::{Bounds, Button, ButtonType, Direction, Driver};
use crate::error::Fault;
use crate::fault_unless;
use crate::supervision::heartbeat::HeartBeat;
use crate::utils::blocking_queue::BlockingQueue;
use crate::utils::floor_set::FloorSet;
use crate::utils::now_ms;
use crate::world_view::{ChangeType, Command, CommandType, ElevatorState, StateChange};

use super::request::{
    all_buttons, button_by_direction, change_type_by_button, optimal_direction,
    priority_floors_in_direction, should_stop,
};
use super::timer::{self, Timer};

/// Floor reported while the car is between floors.
pub const NO_FLOOR: i32 = i32::MIN;

/// Phase of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Serving requests
    Normal,
    /// Doors open, waiting for an inside button or the door timeout
    WaitingForInButton,
    /// Stop button engaged
    Stopped,
}

/// Loop-local state, rebuilt on every (re)start.
#[derive(Debug)]
pub struct LoopState {
    phase: Phase,
    in_buttons: FloorSet,
    in_buttons_last: FloorSet,
    stop_now: bool,
    stop_last: bool,
    prev_floor: Option<i32>,
    door_timer: Timer,
}

impl LoopState {
    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

/// The local car and its control loop.
pub struct Elevator {
    driver: Driver,
    bounds: Bounds,
    commands: BlockingQueue<Command>,
    state_out: BlockingQueue<StateChange>,
    timing: ElevatorTiming,
    elev_state: ElevatorState,
    previous_direction: Direction,
    last_state_update: Option<Instant>,
    floor_buttons: Vec<Button>,
    terminate: Arc<AtomicBool>,
}

fn gen_floor_buttons(bounds: &Bounds) -> Vec<Button> {
    let mut buttons = Vec::new();
    for floor in bounds.floors() {
        for button_type in ButtonType::ALL {
            if bounds.has_button(button_type, floor) {
                buttons.push(Button::new(button_type, floor));
            }
        }
    }
    buttons
}

impl Elevator {
    /// Car `id` driven through `driver`, reading `commands` and reporting to `state_out`.
    pub fn new(
        id: i32,
        driver: Driver,
        commands: BlockingQueue<Command>,
        state_out: BlockingQueue<StateChange>,
        timing: ElevatorTiming,
    ) -> Self {
        let bounds = driver.bounds();
        Self {
            driver,
            bounds,
            commands,
            state_out,
            timing,
            elev_state: ElevatorState::new(id, &bounds),
            previous_direction: Direction::None,
            last_state_update: None,
            floor_buttons: gen_floor_buttons(&bounds),
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Continues from a state recovered from a peer. The car starts idle.
    pub fn recover(&mut self, state: ElevatorState) {
        self.elev_state = state;
        self.elev_state.direction = Direction::None;
    }

    /// Current state of the car.
    pub fn state(&self) -> &ElevatorState {
        &self.elev_state
    }

    /// Flag which ends the loop when set.
    pub fn terminate_flag(&self) -> Arc<AtomicBool> {
        self.terminate.clone()
    }

    /// Checks the car's state and the loop's direction bookkeeping.
    pub fn assert_consistency(&self) -> Result<(), Fault> {
        fault_unless!(
            self.bounds.min_floor() < self.bounds.max_floor(),
            "invalid floor bounds"
        );
        self.elev_state.assert_consistency(&self.bounds)?;
        fault_unless!(
            self.elev_state.id >= 0 && self.elev_state.id != Command::ANY_ID,
            "invalid elevator id"
        );
        Ok(())
    }

    /// Runs cycles until terminated, beating `heartbeat` after every cycle.
    ///
    /// The car is stopped however the loop ends.
    pub fn control_loop(&mut self, heartbeat: &HeartBeat) -> Result<(), Fault> {
        let result = self.run_cycles(heartbeat);
        if let Err(fault) = self.stop_elevator() {
            warn!("could not stop the car on loop exit: {}", fault);
        }
        result
    }

    fn run_cycles(&mut self, heartbeat: &HeartBeat) -> Result<(), Fault> {
        let mut ls = self.start_loop()?;
        while !self.terminate.load(Ordering::Relaxed) {
            self.cycle(&mut ls)?;
            // Last, so a loop restarting over and over does not look alive
            heartbeat.beat();
            thread::sleep(self.timing.poll);
        }
        Ok(())
    }

    /// Brings lamps and state in line with each other and builds fresh loop state.
    pub fn start_loop(&mut self) -> Result<LoopState, Fault> {
        self.initialize_elevator()?;
        let phase = if self.driver.get_stop_lamp() {
            Phase::Stopped
        } else {
            Phase::Normal
        };
        Ok(LoopState {
            phase,
            in_buttons: FloorSet::new(),
            in_buttons_last: FloorSet::new(),
            stop_now: false,
            stop_last: false,
            prev_floor: None,
            door_timer: timer::new(self.timing.door_wait),
        })
    }

    fn initialize_elevator(&mut self) -> Result<(), Fault> {
        let bounds = self.bounds;
        for floor in bounds.floors() {
            let inside = Button::new(ButtonType::INSIDE, floor);
            if self.driver.get_button_lamp(inside)? {
                self.elev_state.inside_buttons.set(true, floor, &bounds)?;
            }
            // the recovered state may hold more than the lamps show
            if self.elev_state.inside_buttons.get(floor, &bounds)? {
                self.driver.set_button_lamp(inside, true)?;
            }
            // hall lamps of other cars' calls are not ours, only our own sets count
            let up = self.elev_state.up_buttons.get(floor, &bounds)?;
            self.driver.set_button_lamp(Button::new(ButtonType::UP, floor), up)?;
            let down = self.elev_state.down_buttons.get(floor, &bounds)?;
            self.driver.set_button_lamp(Button::new(ButtonType::DOWN, floor), down)?;
        }
        if self.driver.get_stop_lamp() {
            self.elev_state.stopped = true;
        }
        if self.driver.get_door_open_lamp() {
            self.elev_state.door_open = true;
        }
        Ok(())
    }

    /// One pass of the control loop.
    pub fn cycle(&mut self, ls: &mut LoopState) -> Result<(), Fault> {
        ls.in_buttons_last = ls.in_buttons;
        ls.in_buttons.reset();
        ls.stop_last = ls.stop_now;
        self.assert_consistency()?;

        self.poll_buttons(ls)?;
        self.handle_stop_button(ls)?;
        self.handle_obstruction()?;
        self.handle_command()?;

        let current = self.update_and_get_floor()?;
        if current == Some(self.bounds.max_floor()) && self.elev_state.direction == Direction::Up {
            self.stop_elevator()?;
        }
        if current == Some(self.bounds.min_floor()) && self.elev_state.direction == Direction::Down {
            self.stop_elevator()?;
        }
        if let Some(floor) = current {
            self.driver.set_floor_indicator(floor)?;
        }
        if current != ls.prev_floor {
            self.emit(ChangeType::OtherChange, current.unwrap_or(NO_FLOOR));
        }

        match ls.phase {
            Phase::Normal => self.normal(ls, current)?,
            Phase::WaitingForInButton => self.waiting_for_in_button(ls)?,
            Phase::Stopped => {}
        }

        let keep_alive_due = self
            .last_state_update
            .map_or(true, |at| at.elapsed() >= self.timing.keep_alive);
        if keep_alive_due {
            self.emit(ChangeType::KeepAlive, current.unwrap_or(NO_FLOOR));
        }
        ls.prev_floor = current;
        Ok(())
    }

    fn poll_buttons(&mut self, ls: &mut LoopState) -> Result<(), Fault> {
        for i in 0..self.floor_buttons.len() {
            let button = self.floor_buttons[i];
            if !self.driver.get_button_signal(button)? {
                continue;
            }
            if !self.driver.get_button_lamp(button)? {
                debug!("button {:?} pressed at floor {}", button.button_type, button.floor);
                self.set_button_lamp_and_flag(button, true)?;
                self.emit(change_type_by_button(button.button_type), button.floor);
            }
            // a re-press of a lit inside button still closes the doors
            if button.button_type == ButtonType::INSIDE {
                ls.in_buttons.set(true, button.floor, &self.bounds)?;
            }
        }
        Ok(())
    }

    fn handle_stop_button(&mut self, ls: &mut LoopState) -> Result<(), Fault> {
        ls.stop_now = self.driver.get_stop()?;
        if !ls.stop_now || ls.stop_now == ls.stop_last {
            return Ok(());
        }
        self.elev_state.stopped = !self.driver.get_stop_lamp();
        self.driver.set_stop_lamp(self.elev_state.stopped)?;
        if self.elev_state.stopped {
            info!("stop button engaged");
            self.stop_elevator()?;
            ls.phase = Phase::Stopped;
        } else {
            info!("stop button released, resuming {:?}", self.previous_direction);
            if self.previous_direction != Direction::None || all_buttons(&self.elev_state).has_any() {
                self.start_elevator(self.previous_direction)?;
            }
            ls.phase = Phase::Normal;
        }
        let floor = self.update_and_get_floor()?.unwrap_or(NO_FLOOR);
        self.emit(ChangeType::OtherChange, floor);
        Ok(())
    }

    fn handle_obstruction(&mut self) -> Result<(), Fault> {
        if !self.driver.get_obstruction()? {
            return Ok(());
        }
        warn!("door obstruction, shutting the car down");
        self.stop_elevator()?;
        self.driver.shutdown()?;
        // No heartbeat while obstructed, the supervisor restarts the node
        while self.driver.get_obstruction()? && !self.terminate.load(Ordering::Relaxed) {
            thread::sleep(self.timing.poll);
        }
        Err(Fault::assertion(
            "door obstruction cleared",
            format!("{}:{}", file!(), line!()),
        ))
    }

    fn handle_command(&mut self) -> Result<(), Fault> {
        let Some(command) = self.commands.try_dequeue() else {
            return Ok(());
        };
        fault_unless!(command.is_for(self.elev_state.id), "command to other elevator");
        let bounds = self.bounds;
        let floor = command.target_floor;
        match command.command_type {
            CommandType::Empty => {}
            CommandType::CallToFloorAndGoUp => {
                self.elev_state.up_buttons.set(true, floor, &bounds)?;
                self.driver.set_button_lamp(Button::new(ButtonType::UP, floor), true)?;
                self.emit(ChangeType::GoingToServeUp, floor);
            }
            CommandType::CallToFloorAndGoDown => {
                self.elev_state.down_buttons.set(true, floor, &bounds)?;
                self.driver.set_button_lamp(Button::new(ButtonType::DOWN, floor), true)?;
                self.emit(ChangeType::GoingToServeDown, floor);
            }
            CommandType::TurnOnLightUp => {
                self.driver.set_button_lamp(Button::new(ButtonType::UP, floor), true)?;
            }
            CommandType::TurnOffLightUp => {
                self.driver.set_button_lamp(Button::new(ButtonType::UP, floor), false)?;
            }
            CommandType::TurnOnLightDown => {
                self.driver.set_button_lamp(Button::new(ButtonType::DOWN, floor), true)?;
            }
            CommandType::TurnOffLightDown => {
                self.driver.set_button_lamp(Button::new(ButtonType::DOWN, floor), false)?;
            }
        }
        Ok(())
    }

    fn normal(&mut self, ls: &mut LoopState, current: Option<i32>) -> Result<(), Fault> {
        if let Some(floor) = current {
            if should_stop(&self.elev_state, floor, &self.bounds)? {
                let was_idle = self.elev_state.direction == Direction::None;
                self.set_button_lamp_and_flag(Button::new(ButtonType::INSIDE, floor), false)?;
                self.driver.set_door_open_lamp(true)?;
                self.elev_state.door_open = true;
                ls.phase = Phase::WaitingForInButton;
                ls.door_timer.timer_start();
                self.stop_elevator()?;
                self.emit(ChangeType::Served, floor);
                if was_idle {
                    // an idle car has no travel direction to pick a call by
                    self.clear_hall_calls(floor)?;
                }
                return Ok(());
            }
        }
        if self.elev_state.direction == Direction::None {
            if all_buttons(&self.elev_state).has_any() {
                let previous = self.previous_direction;
                if priority_floors_in_direction(&self.elev_state, previous, &self.bounds)? {
                    self.start_elevator(previous)?;
                } else {
                    self.start_elevator(Direction::None)?;
                }
                self.emit(ChangeType::OtherChange, current.unwrap_or(NO_FLOOR));
            }
            self.clear_direction_button_lamp()?;
        }
        Ok(())
    }

    fn waiting_for_in_button(&mut self, ls: &mut LoopState) -> Result<(), Fault> {
        let timeout = ls.door_timer.timer_timeouted();
        if !FloorSet::has_additional(ls.in_buttons_last, ls.in_buttons) && !timeout {
            return Ok(());
        }
        let floor = self.elev_state.last_floor;
        self.driver.set_door_open_lamp(false)?;
        self.elev_state.door_open = false;
        ls.door_timer.timer_stop();
        ls.phase = Phase::Normal;
        self.emit(ChangeType::OtherChange, floor);
        if timeout {
            self.clear_hall_calls(floor)?;
        } else {
            self.clear_direction_button_lamp()?;
        }
        Ok(())
    }

    /// Clears both hall calls at `floor`, reporting those that were pending or lit.
    fn clear_hall_calls(&mut self, floor: i32) -> Result<(), Fault> {
        let bounds = self.bounds;
        for (button_type, served) in [
            (ButtonType::UP, ChangeType::ServedUp),
            (ButtonType::DOWN, ChangeType::ServedDown),
        ] {
            let button = Button::new(button_type, floor);
            let pending = self.elev_state.buttons_mut(button_type).set(false, floor, &bounds)?;
            let lit = self.driver.get_button_lamp(button)?;
            self.driver.set_button_lamp(button, false)?;
            if pending || lit {
                self.emit(served, floor);
            }
        }
        Ok(())
    }

    fn clear_direction_button_lamp(&mut self) -> Result<(), Fault> {
        let floor = self.elev_state.last_floor;
        let button = if floor == self.bounds.max_floor() {
            Button::new(ButtonType::DOWN, floor)
        } else if floor == self.bounds.min_floor() {
            Button::new(ButtonType::UP, floor)
        } else {
            match button_by_direction(self.elev_state.direction, floor) {
                Some(button) => button,
                None => return Ok(()),
            }
        };
        let bounds = self.bounds;
        if self
            .elev_state
            .buttons_mut(button.button_type)
            .set(false, floor, &bounds)?
        {
            let served = if button.button_type == ButtonType::UP {
                ChangeType::ServedUp
            } else {
                ChangeType::ServedDown
            };
            self.emit(served, floor);
        }
        self.driver.set_button_lamp(button, false)
    }

    fn set_button_lamp_and_flag(&mut self, button: Button, on: bool) -> Result<(), Fault> {
        self.driver.set_button_lamp(button, on)?;
        if button.button_type == ButtonType::INSIDE {
            self.elev_state.inside_buttons.set(on, button.floor, &self.bounds)?;
        }
        Ok(())
    }

    fn update_and_get_floor(&mut self) -> Result<Option<i32>, Fault> {
        let floor = self.driver.get_floor()?;
        if let Some(f) = floor {
            self.elev_state.last_floor = f;
        }
        Ok(floor)
    }

    fn stop_elevator(&mut self) -> Result<(), Fault> {
        if self.elev_state.direction != Direction::None {
            self.previous_direction = self.elev_state.direction;
        }
        self.elev_state.direction = Direction::None;
        self.driver.stop_elevator()
    }

    fn start_elevator(&mut self, direction: Direction) -> Result<(), Fault> {
        self.elev_state.direction = direction;
        // the sensor may know better than last_floor
        self.update_and_get_floor()?;
        if self.elev_state.last_floor == self.bounds.min_floor() {
            self.elev_state.direction = Direction::Up;
        } else if self.elev_state.last_floor == self.bounds.max_floor() {
            self.elev_state.direction = Direction::Down;
        }
        if self.elev_state.direction == Direction::None {
            self.elev_state.direction = optimal_direction(&self.elev_state, &self.bounds)?;
        }
        debug!("starting {:?} from floor {}", self.elev_state.direction, self.elev_state.last_floor);
        self.driver
            .set_motor_speed(self.elev_state.direction, config::MOTOR_SPEED)?;
        self.driver.set_door_open_lamp(false)?;
        self.elev_state.door_open = false;
        Ok(())
    }

    fn emit(&mut self, change_type: ChangeType, floor: i32) {
        self.elev_state.timestamp = now_ms();
        self.last_state_update = Some(Instant::now());
        self.state_out
            .enqueue(StateChange::new(change_type, floor, self.elev_state));
    }
}
