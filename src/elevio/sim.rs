//! In-memory car used by `--simulator` and by the tests.
//!
//! The car moves one floor per `travel` while the motor runs and stops at the
//! ends of the shaft. Call buttons latch on [SimHandle::press] until the next
//! read, like a quick press on a real panel. Stop and obstruction are levels.

use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{ButtonType, Direction, ElevatorIo};

/// Distance from a floor centre the floor sensor still reports the floor
const SENSOR_WINDOW: f64 = 0.15;

#[derive(Debug)]
struct SimCar {
    floors: u8,
    travel: Duration,
    position: f64,
    motor: Direction,
    last_update: Instant,
    pressed: HashSet<(ButtonType, u8)>,
    lamps: HashSet<(ButtonType, u8)>,
    door_light: bool,
    stop_light: bool,
    indicator: u8,
    stop: bool,
    obstruction: bool,
}

impl SimCar {
    fn advance(&mut self) {
        let now = Instant::now();
        let step = (now - self.last_update).as_secs_f64() / self.travel.as_secs_f64();
        self.last_update = now;
        let top = (self.floors - 1) as f64;
        self.position = match self.motor {
            Direction::Up => (self.position + step).min(top),
            Direction::Down => (self.position - step).max(0.0),
            Direction::None => self.position,
        };
    }

    fn sensor(&self) -> Option<u8> {
        let nearest = self.position.round();
        ((self.position - nearest).abs() <= SENSOR_WINDOW).then_some(nearest as u8)
    }
}

fn lock(car: &Mutex<SimCar>) -> MutexGuard<'_, SimCar> {
    car.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Simulated car, handed to the [Driver](super::Driver) as its [ElevatorIo].
#[derive(Debug)]
pub struct SimElevator {
    car: Arc<Mutex<SimCar>>,
}

/// Outside view of a [SimElevator], used to press buttons and look at lamps.
#[derive(Debug, Clone)]
pub struct SimHandle {
    car: Arc<Mutex<SimCar>>,
}

impl SimElevator {
    /// Car with `floors` floors parked at the lowest one.
    pub fn new(floors: u8, travel: Duration) -> Self {
        let car = SimCar {
            floors: floors.max(1),
            travel,
            position: 0.0,
            motor: Direction::None,
            last_update: Instant::now(),
            pressed: HashSet::new(),
            lamps: HashSet::new(),
            door_light: false,
            stop_light: false,
            indicator: 0,
            stop: false,
            obstruction: false,
        };
        Self {
            car: Arc::new(Mutex::new(car)),
        }
    }

    /// Handle sharing this car.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            car: self.car.clone(),
        }
    }
}

impl ElevatorIo for SimElevator {
    fn motor_direction(&mut self, dirn: Direction) -> io::Result<()> {
        let mut car = lock(&self.car);
        car.advance();
        car.motor = dirn;
        Ok(())
    }

    fn call_button_light(&mut self, button_type: ButtonType, floor: u8, on: bool) -> io::Result<()> {
        let mut car = lock(&self.car);
        if on {
            car.lamps.insert((button_type, floor));
        } else {
            car.lamps.remove(&(button_type, floor));
        }
        Ok(())
    }

    fn floor_indicator(&mut self, floor: u8) -> io::Result<()> {
        lock(&self.car).indicator = floor;
        Ok(())
    }

    fn door_light(&mut self, on: bool) -> io::Result<()> {
        lock(&self.car).door_light = on;
        Ok(())
    }

    fn stop_button_light(&mut self, on: bool) -> io::Result<()> {
        lock(&self.car).stop_light = on;
        Ok(())
    }

    fn call_button(&mut self, button_type: ButtonType, floor: u8) -> io::Result<bool> {
        Ok(lock(&self.car).pressed.remove(&(button_type, floor)))
    }

    fn floor_sensor(&mut self) -> io::Result<Option<u8>> {
        let mut car = lock(&self.car);
        car.advance();
        Ok(car.sensor())
    }

    fn stop_button(&mut self) -> io::Result<bool> {
        Ok(lock(&self.car).stop)
    }

    fn obstruction(&mut self) -> io::Result<bool> {
        Ok(lock(&self.car).obstruction)
    }
}

impl SimHandle {
    /// Presses a button once, `floor` is zero based.
    pub fn press(&self, button_type: ButtonType, floor: u8) {
        lock(&self.car).pressed.insert((button_type, floor));
    }

    /// Holds or releases the stop button.
    pub fn set_stop(&self, pressed: bool) {
        lock(&self.car).stop = pressed;
    }

    /// Blocks or clears the door.
    pub fn set_obstruction(&self, blocked: bool) {
        lock(&self.car).obstruction = blocked;
    }

    /// Moves the parked car to `floor`.
    pub fn place_at(&self, floor: u8) {
        let mut car = lock(&self.car);
        car.position = floor.min(car.floors - 1) as f64;
        car.last_update = Instant::now();
    }

    /// Whether a button lamp is lit.
    pub fn lamp(&self, button_type: ButtonType, floor: u8) -> bool {
        lock(&self.car).lamps.contains(&(button_type, floor))
    }

    /// Whether the door open lamp is lit.
    pub fn door_light(&self) -> bool {
        lock(&self.car).door_light
    }

    /// Whether the stop lamp is lit.
    pub fn stop_light(&self) -> bool {
        lock(&self.car).stop_light
    }

    /// Floor shown on the indicator.
    pub fn indicator(&self) -> u8 {
        lock(&self.car).indicator
    }

    /// Current motor direction.
    pub fn motor(&self) -> Direction {
        lock(&self.car).motor
    }

    /// Position in floors from the bottom of the shaft.
    pub fn position(&self) -> f64 {
        let mut car = lock(&self.car);
        car.advance();
        car.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn car_moves_while_motor_runs() {
        let mut sim = SimElevator::new(4, Duration::from_millis(40));
        let handle = sim.handle();
        assert_eq!(sim.floor_sensor().unwrap(), Some(0));
        sim.motor_direction(Direction::Up).unwrap();
        sleep(Duration::from_millis(60));
        sim.motor_direction(Direction::None).unwrap();
        let pos = handle.position();
        assert!(pos > 1.0 && pos < 3.0, "position {pos}");
    }

    #[test]
    fn car_stops_at_the_ends() {
        let mut sim = SimElevator::new(3, Duration::from_millis(5));
        let handle = sim.handle();
        sim.motor_direction(Direction::Up).unwrap();
        sleep(Duration::from_millis(40));
        assert_eq!(sim.floor_sensor().unwrap(), Some(2));
        sim.motor_direction(Direction::Down).unwrap();
        sleep(Duration::from_millis(40));
        assert_eq!(handle.position(), 0.0);
    }

    #[test]
    fn presses_latch_until_read() {
        let mut sim = SimElevator::new(4, Duration::from_millis(40));
        let handle = sim.handle();
        handle.press(ButtonType::INSIDE, 2);
        assert!(sim.call_button(ButtonType::INSIDE, 2).unwrap());
        assert!(!sim.call_button(ButtonType::INSIDE, 2).unwrap());
    }
}
