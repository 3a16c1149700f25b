//! ## Elevator I/O module for the local elevator
//!
//! The register-level access to a car goes through the [ElevatorIo] trait,
//! implemented by the elevator server client in [elev] and by the in-memory
//! car in [sim]. The control loop never talks to those directly, it uses the
//! [Driver] which adds floor numbering, bounds checks and a lamp shadow.
//!
//! ## Overview
//! - [`ButtonType`]: up, down and inside buttons, numbered like the server protocol.
//! - [`Button`]: a button type at a floor.
//! - [`Direction`]: travel direction of a car.
//! - [`Bounds`]: the floor range of a car, floors keep their panel numbers.
//! - [`Driver`]: shared handle used by the control loop.
//!
//! The elevator server protocol has no way to read lamps back, the [Driver]
//! keeps what it last wrote in [AtomicFloorSet]s and answers lamp reads from there.

pub mod elev;
pub mod sim;

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::Fault;
use crate::fault_unless;
use crate::utils::floor_set::{AtomicFloorSet, FloorSet};

/// Type of a call button, numbered like the elevator server protocol.
///
/// ## Variants
/// - `UP`: hall button asking to go up.
/// - `DOWN`: hall button asking to go down.
/// - `INSIDE`: button on the car panel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum ButtonType {
    /// Call to go up.
    UP = 0,
    /// Call to go down.
    DOWN = 1,
    /// Call from inside the car.
    INSIDE = 2,
}

impl ButtonType {
    /// Every button type, in protocol order.
    pub const ALL: [ButtonType; 3] = [ButtonType::UP, ButtonType::DOWN, ButtonType::INSIDE];
}

/// A button at a floor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Button {
    /// Which of the three buttons
    pub button_type: ButtonType,
    /// Panel floor number
    pub floor: i32,
}

impl Button {
    /// Button of `button_type` at `floor`.
    pub fn new(button_type: ButtonType, floor: i32) -> Self {
        Self { button_type, floor }
    }
}

/// Travel direction of a car.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Standing still
    #[default]
    None,
    /// Moving up
    Up,
    /// Moving down
    Down,
}

impl Direction {
    fn encode(self) -> i32 {
        match self {
            Direction::None => 0,
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }

    fn decode(v: i32) -> Self {
        match v {
            1 => Direction::Up,
            -1 => Direction::Down,
            _ => Direction::None,
        }
    }
}

/// Floor range served by a car, both ends inclusive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bounds {
    min: i32,
    max: i32,
}

impl Bounds {
    /// Range `min..=max`.
    ///
    /// Ranges wider than a [FloorSet] can hold are cut to its capacity.
    pub fn new(min: i32, max: i32) -> Self {
        let max = max.max(min).min(min + config::MAX_FLOORS - 1);
        Self { min, max }
    }

    /// Range of a car with `floors` floors numbered from [config::MIN_FLOOR].
    pub fn with_floors(floors: u8) -> Self {
        Self::new(config::MIN_FLOOR, config::MIN_FLOOR + floors.max(1) as i32 - 1)
    }

    /// Lowest floor.
    pub fn min_floor(&self) -> i32 {
        self.min
    }

    /// Highest floor.
    pub fn max_floor(&self) -> i32 {
        self.max
    }

    /// Number of floors.
    pub fn floor_count(&self) -> i32 {
        self.max - self.min + 1
    }

    /// Whether `floor` is within the range.
    pub fn contains(&self, floor: i32) -> bool {
        self.min <= floor && floor <= self.max
    }

    /// Every floor, lowest first.
    pub fn floors(&self) -> impl DoubleEndedIterator<Item = i32> {
        self.min..=self.max
    }

    /// Whether the car has a `button_type` button at `floor`.
    pub fn has_button(&self, button_type: ButtonType, floor: i32) -> bool {
        self.contains(floor)
            && match button_type {
                ButtonType::UP => floor != self.max,
                ButtonType::DOWN => floor != self.min,
                ButtonType::INSIDE => true,
            }
    }
}

/// Register-level access to a car.
///
/// Floors are zero based like on the elevator server wire, [Driver] does the
/// translation to panel floors.
pub trait ElevatorIo: Send {
    /// Starts the motor in `dirn`, [Direction::None] stops it.
    fn motor_direction(&mut self, dirn: Direction) -> io::Result<()>;
    /// Turns a button lamp on or off.
    fn call_button_light(&mut self, button_type: ButtonType, floor: u8, on: bool) -> io::Result<()>;
    /// Shows `floor` on the floor indicator.
    fn floor_indicator(&mut self, floor: u8) -> io::Result<()>;
    /// Turns the door open lamp on or off.
    fn door_light(&mut self, on: bool) -> io::Result<()>;
    /// Turns the stop lamp on or off.
    fn stop_button_light(&mut self, on: bool) -> io::Result<()>;
    /// Whether the button is pressed.
    fn call_button(&mut self, button_type: ButtonType, floor: u8) -> io::Result<bool>;
    /// Floor the car is at, `None` between floors.
    fn floor_sensor(&mut self) -> io::Result<Option<u8>>;
    /// Whether the stop button is pressed.
    fn stop_button(&mut self) -> io::Result<bool>;
    /// Whether the door is obstructed.
    fn obstruction(&mut self) -> io::Result<bool>;
}

struct DriverInner {
    io: Mutex<Box<dyn ElevatorIo>>,
    bounds: Bounds,
    up_lamps: AtomicFloorSet,
    down_lamps: AtomicFloorSet,
    inside_lamps: AtomicFloorSet,
    stop_lamp: AtomicBool,
    door_lamp: AtomicBool,
    floor_indicator: AtomicI32,
    last_direction: AtomicI32,
}

impl Drop for DriverInner {
    fn drop(&mut self) {
        // Never leave a running motor behind
        let io = self.io.get_mut().unwrap_or_else(PoisonError::into_inner);
        let _ = io.motor_direction(Direction::None);
    }
}

/// Shared handle to the local car.
///
/// Cloning is cheap, all clones drive the same car. Each call holds the
/// connection lock for one exchange with the [ElevatorIo].
#[derive(Clone)]
pub struct Driver {
    inner: Arc<DriverInner>,
}

impl Driver {
    /// Driver over `io` serving `bounds`. The motor is stopped right away.
    pub fn new(io: Box<dyn ElevatorIo>, bounds: Bounds) -> Result<Self, Fault> {
        let driver = Self {
            inner: Arc::new(DriverInner {
                io: Mutex::new(io),
                bounds,
                up_lamps: AtomicFloorSet::new(),
                down_lamps: AtomicFloorSet::new(),
                inside_lamps: AtomicFloorSet::new(),
                stop_lamp: AtomicBool::new(false),
                door_lamp: AtomicBool::new(false),
                floor_indicator: AtomicI32::new(bounds.min_floor()),
                last_direction: AtomicI32::new(0),
            }),
        };
        driver.stop_elevator()?;
        Ok(driver)
    }

    /// Floor range of the car.
    pub fn bounds(&self) -> Bounds {
        self.inner.bounds
    }

    /// Lowest floor.
    pub fn min_floor(&self) -> i32 {
        self.inner.bounds.min_floor()
    }

    /// Highest floor.
    pub fn max_floor(&self) -> i32 {
        self.inner.bounds.max_floor()
    }

    /// A panic in another holder leaves the connection usable.
    fn io(&self) -> MutexGuard<'_, Box<dyn ElevatorIo>> {
        self.inner.io.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index(&self, floor: i32) -> Result<u8, Fault> {
        fault_unless!(self.inner.bounds.contains(floor), "floor out of bounds");
        Ok((floor - self.min_floor()) as u8)
    }

    fn lamps(&self, button_type: ButtonType) -> &AtomicFloorSet {
        match button_type {
            ButtonType::UP => &self.inner.up_lamps,
            ButtonType::DOWN => &self.inner.down_lamps,
            ButtonType::INSIDE => &self.inner.inside_lamps,
        }
    }

    /// Turns every lamp off.
    pub fn init(&self) -> Result<(), Fault> {
        let bounds = self.bounds();
        for floor in bounds.floors() {
            for button_type in ButtonType::ALL {
                if bounds.has_button(button_type, floor) {
                    self.set_button_lamp(Button::new(button_type, floor), false)?;
                }
            }
        }
        self.set_stop_lamp(false)?;
        self.set_door_open_lamp(false)?;
        Ok(())
    }

    /// Stops the car and turns every lamp off.
    pub fn shutdown(&self) -> Result<(), Fault> {
        self.stop_elevator()?;
        self.init()
    }

    /// Sets a button lamp, buttons the car does not have are ignored.
    pub fn set_button_lamp(&self, button: Button, on: bool) -> Result<(), Fault> {
        let index = self.index(button.floor)?;
        if !self.inner.bounds.has_button(button.button_type, button.floor) {
            return Ok(());
        }
        self.io().call_button_light(button.button_type, index, on)?;
        self.lamps(button.button_type).set(on, button.floor, &self.inner.bounds)?;
        Ok(())
    }

    /// Last value written to a button lamp.
    pub fn get_button_lamp(&self, button: Button) -> Result<bool, Fault> {
        self.lamps(button.button_type).get(button.floor, &self.inner.bounds)
    }

    /// Every lit lamp of one button type.
    pub fn lit_lamps(&self, button_type: ButtonType) -> FloorSet {
        self.lamps(button_type).load()
    }

    /// Sets the stop lamp.
    pub fn set_stop_lamp(&self, on: bool) -> Result<(), Fault> {
        self.io().stop_button_light(on)?;
        self.inner.stop_lamp.store(on, Ordering::Release);
        Ok(())
    }

    /// Last value written to the stop lamp.
    pub fn get_stop_lamp(&self) -> bool {
        self.inner.stop_lamp.load(Ordering::Acquire)
    }

    /// Sets the door open lamp.
    pub fn set_door_open_lamp(&self, on: bool) -> Result<(), Fault> {
        self.io().door_light(on)?;
        self.inner.door_lamp.store(on, Ordering::Release);
        Ok(())
    }

    /// Last value written to the door open lamp.
    pub fn get_door_open_lamp(&self) -> bool {
        self.inner.door_lamp.load(Ordering::Acquire)
    }

    /// Shows `floor` on the floor indicator.
    pub fn set_floor_indicator(&self, floor: i32) -> Result<(), Fault> {
        let index = self.index(floor)?;
        self.io().floor_indicator(index)?;
        self.inner.floor_indicator.store(floor, Ordering::Release);
        Ok(())
    }

    /// Floor last shown on the indicator.
    pub fn get_floor_indicator(&self) -> i32 {
        self.inner.floor_indicator.load(Ordering::Acquire)
    }

    /// Whether the button is pressed, buttons the car does not have never are.
    pub fn get_button_signal(&self, button: Button) -> Result<bool, Fault> {
        let index = self.index(button.floor)?;
        if !self.inner.bounds.has_button(button.button_type, button.floor) {
            return Ok(false);
        }
        Ok(self.io().call_button(button.button_type, index)?)
    }

    /// Starts the motor in `direction`.
    ///
    /// The elevator server runs at a fixed speed, `speed` only has to be positive.
    pub fn set_motor_speed(&self, direction: Direction, speed: i32) -> Result<(), Fault> {
        fault_unless!(speed > 0, "speed must be positive");
        self.io().motor_direction(direction)?;
        self.inner
            .last_direction
            .store(direction.encode(), Ordering::Release);
        Ok(())
    }

    /// Direction the motor was last started in, [Direction::None] once stopped.
    pub fn motor_direction(&self) -> Direction {
        Direction::decode(self.inner.last_direction.load(Ordering::Acquire))
    }

    /// Stops the motor.
    pub fn stop_elevator(&self) -> Result<(), Fault> {
        self.io().motor_direction(Direction::None)?;
        self.inner.last_direction.store(0, Ordering::Release);
        Ok(())
    }

    /// Stops the motor unless another exchange holds the connection.
    ///
    /// Returns whether the car was stopped. Used on the way out after a fatal
    /// fault, where the holder may be stuck on a stalled server.
    pub fn try_stop_elevator(&self) -> Result<bool, Fault> {
        let mut io = match self.inner.io.try_lock() {
            Ok(io) => io,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(false),
        };
        io.motor_direction(Direction::None)?;
        self.inner.last_direction.store(0, Ordering::Release);
        Ok(true)
    }

    /// Floor the car is at, `None` between floors.
    pub fn get_floor(&self) -> Result<Option<i32>, Fault> {
        let sensor = self.io().floor_sensor()?;
        Ok(sensor
            .map(|index| self.min_floor() + index as i32)
            .filter(|floor| self.inner.bounds.contains(*floor)))
    }

    /// Whether the stop button is pressed.
    pub fn get_stop(&self) -> Result<bool, Fault> {
        Ok(self.io().stop_button()?)
    }

    /// Whether the door is obstructed.
    pub fn get_obstruction(&self) -> Result<bool, Fault> {
        Ok(self.io().obstruction()?)
    }
}

#[cfg(test)]
mod tests {
    use super::sim::SimElevator;
    use super::*;
    use std::time::Duration;

    fn driver() -> (Driver, sim::SimHandle) {
        let sim = SimElevator::new(4, Duration::from_millis(50));
        let handle = sim.handle();
        (Driver::new(Box::new(sim), Bounds::with_floors(4)).unwrap(), handle)
    }

    #[test]
    fn bounds_follow_panel_numbering() {
        let b = Bounds::with_floors(4);
        assert_eq!((b.min_floor(), b.max_floor(), b.floor_count()), (1, 4, 4));
        assert!(!b.has_button(ButtonType::UP, 4));
        assert!(!b.has_button(ButtonType::DOWN, 1));
        assert!(b.has_button(ButtonType::INSIDE, 1));
        assert_eq!(Bounds::new(0, 200).floor_count(), 64);
    }

    #[test]
    fn lamps_are_shadowed_and_reach_the_car() {
        let (d, sim) = driver();
        let b = Button::new(ButtonType::UP, 2);
        d.set_button_lamp(b, true).unwrap();
        assert!(d.get_button_lamp(b).unwrap());
        assert!(sim.lamp(ButtonType::UP, 1));
        d.init().unwrap();
        assert!(!d.get_button_lamp(b).unwrap());
        assert!(!sim.lamp(ButtonType::UP, 1));
    }

    #[test]
    fn missing_buttons_are_ignored() {
        let (d, _sim) = driver();
        let b = Button::new(ButtonType::UP, 4);
        d.set_button_lamp(b, true).unwrap();
        assert!(!d.get_button_lamp(b).unwrap());
        assert!(!d.get_button_signal(b).unwrap());
    }

    #[test]
    fn out_of_bounds_floor_is_a_fault() {
        let (d, _sim) = driver();
        assert!(d.set_floor_indicator(5).is_err());
        assert!(d.get_button_signal(Button::new(ButtonType::INSIDE, 0)).is_err());
    }

    #[test]
    fn floor_sensor_uses_panel_numbers() {
        let (d, _sim) = driver();
        assert_eq!(d.get_floor().unwrap(), Some(1));
    }

    /// Car whose floor sensor hangs like a stalled elevator server.
    struct StalledIo {
        stall: Duration,
        motor: Arc<AtomicI32>,
    }

    impl ElevatorIo for StalledIo {
        fn motor_direction(&mut self, dirn: Direction) -> io::Result<()> {
            self.motor.store(dirn.encode(), Ordering::SeqCst);
            Ok(())
        }
        fn call_button_light(&mut self, _: ButtonType, _: u8, _: bool) -> io::Result<()> {
            Ok(())
        }
        fn floor_indicator(&mut self, _: u8) -> io::Result<()> {
            Ok(())
        }
        fn door_light(&mut self, _: bool) -> io::Result<()> {
            Ok(())
        }
        fn stop_button_light(&mut self, _: bool) -> io::Result<()> {
            Ok(())
        }
        fn call_button(&mut self, _: ButtonType, _: u8) -> io::Result<bool> {
            Ok(false)
        }
        fn floor_sensor(&mut self) -> io::Result<Option<u8>> {
            std::thread::sleep(self.stall);
            Err(io::ErrorKind::TimedOut.into())
        }
        fn stop_button(&mut self) -> io::Result<bool> {
            Ok(false)
        }
        fn obstruction(&mut self) -> io::Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn stop_on_the_way_out_does_not_wait_for_a_stalled_exchange() {
        let motor = Arc::new(AtomicI32::new(0));
        let io = StalledIo {
            stall: Duration::from_millis(500),
            motor: motor.clone(),
        };
        let d = Driver::new(Box::new(io), Bounds::with_floors(4)).unwrap();
        d.set_motor_speed(Direction::Up, config::MOTOR_SPEED).unwrap();

        let reader = {
            let d = d.clone();
            std::thread::spawn(move || d.get_floor())
        };
        std::thread::sleep(Duration::from_millis(50));
        let started = std::time::Instant::now();
        assert!(!d.try_stop_elevator().unwrap());
        assert!(started.elapsed() < Duration::from_millis(100));

        assert!(reader.join().unwrap().is_err());
        assert!(d.try_stop_elevator().unwrap());
        assert_eq!(Direction::decode(motor.load(Ordering::SeqCst)), Direction::None);
        assert_eq!(d.motor_direction(), Direction::None);
    }

    #[test]
    fn dropping_the_driver_stops_the_motor() {
        let (d, sim) = driver();
        d.set_motor_speed(Direction::Up, config::MOTOR_SPEED).unwrap();
        assert_eq!(sim.motor(), Direction::Up);
        assert!(d.set_motor_speed(Direction::Up, 0).is_err());
        drop(d);
        assert_eq!(sim.motor(), Direction::None);
    }
}
