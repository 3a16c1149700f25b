//! One node with a simulated car, the scheduler and the car wired through
//! local queues the way the UDP queues wire them between nodes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use elevatorbank::config::ElevatorTiming;
use elevatorbank::elevator_logic::{self, Elevator};
use elevatorbank::elevio::sim::SimElevator;
use elevatorbank::elevio::{Bounds, ButtonType, Driver};
use elevatorbank::manager::{RequestTiming, Scheduler, SchedulerQueues};
use elevatorbank::supervision::heartbeat::HeartBeat;
use elevatorbank::world_view::{ChangeType, GlobalState, StateChange};

fn wait_for_change(
    out: &elevatorbank::utils::blocking_queue::BlockingQueue<StateChange>,
    seen: &mut Vec<StateChange>,
    wanted: ChangeType,
    floor: i32,
) -> bool {
    let limit = Instant::now() + Duration::from_secs(10);
    while Instant::now() < limit {
        if let Some(change) = out.timeout_dequeue(Duration::from_millis(50)) {
            seen.push(change);
            if change.change_type == wanted && change.change_floor == floor {
                return true;
            }
        }
    }
    false
}

#[test]
fn hall_call_is_assigned_served_and_cleared() {
    let bounds = Bounds::with_floors(4);
    let sim = SimElevator::new(4, Duration::from_millis(200));
    let car = sim.handle();
    let driver = Driver::new(Box::new(sim), bounds).unwrap();

    let queues = SchedulerQueues::default();
    let global_state = Arc::new(GlobalState::new());
    let timing = ElevatorTiming {
        poll: Duration::from_millis(5),
        keep_alive: Duration::from_millis(200),
        door_wait: Duration::from_millis(300),
    };
    let elevator = Elevator::new(0, driver, queues.commands_to_local.clone(), queues.state_in.clone(), timing);
    let scheduler = Scheduler::new(0, bounds, global_state.clone(), queues.clone(), RequestTiming::default());

    let beat = || Arc::new(HeartBeat::new(Duration::from_secs(5)));
    let _car_loop = elevator_logic::run_local_elevator(elevator, beat()).unwrap();
    let _scheduler_loops = scheduler.run(beat(), beat()).unwrap();

    let mut seen = Vec::new();
    // first keep-alive registers the car
    assert!(wait_for_change(&queues.state_out, &mut seen, ChangeType::KeepAlive, 1));
    assert!(global_state.has(0));

    car.press(ButtonType::UP, 1);
    assert!(wait_for_change(&queues.state_out, &mut seen, ChangeType::ServedUp, 2));

    let order: Vec<ChangeType> = seen
        .iter()
        .filter(|c| c.change_floor == 2)
        .map(|c| c.change_type)
        .filter(|t| *t != ChangeType::KeepAlive && *t != ChangeType::OtherChange)
        .collect();
    assert_eq!(
        order,
        vec![
            ChangeType::ButtonUpPressed,
            ChangeType::GoingToServeUp,
            ChangeType::Served,
            ChangeType::ServedUp,
        ]
    );
    assert_eq!(car.indicator(), 1);

    // the lamp-off broadcast reaches the car
    let limit = Instant::now() + Duration::from_secs(2);
    while car.lamp(ButtonType::UP, 1) && Instant::now() < limit {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!car.lamp(ButtonType::UP, 1));

    let state = global_state.get(0).unwrap();
    assert_eq!(state.last_floor, 2);
    assert!(!state.up_buttons.has_any());
    assert!(!global_state.up_buttons().has_any());
}

#[test]
fn inside_call_moves_the_car_without_the_scheduler() {
    let bounds = Bounds::with_floors(4);
    let sim = SimElevator::new(4, Duration::from_millis(100));
    let car = sim.handle();
    let driver = Driver::new(Box::new(sim), bounds).unwrap();
    let queues = SchedulerQueues::default();
    let timing = ElevatorTiming {
        poll: Duration::from_millis(5),
        keep_alive: Duration::from_secs(60),
        door_wait: Duration::from_millis(200),
    };
    let elevator = Elevator::new(0, driver, queues.commands_to_local.clone(), queues.state_in.clone(), timing);
    let _car_loop = elevator_logic::run_local_elevator(elevator, Arc::new(HeartBeat::new(Duration::from_secs(5)))).unwrap();

    car.press(ButtonType::INSIDE, 2);
    let mut seen = Vec::new();
    assert!(wait_for_change(&queues.state_in, &mut seen, ChangeType::Served, 3));
    assert!(seen
        .iter()
        .any(|c| c.change_type == ChangeType::InsideButtonPressed && c.change_floor == 3));
    assert!(!car.lamp(ButtonType::INSIDE, 2));
}
