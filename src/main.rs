use std::net::SocketAddrV4;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use log::{error, info, warn};

use elevatorbank::config::{self, ElevatorTiming, Settings};
use elevatorbank::elevator_logic::{self, Elevator};
use elevatorbank::elevio::elev::ElevatorServer;
use elevatorbank::elevio::sim::SimElevator;
use elevatorbank::elevio::{Bounds, Driver, ElevatorIo};
use elevatorbank::init;
use elevatorbank::manager::{RequestTiming, Scheduler, SchedulerQueues};
use elevatorbank::network::udp_queue::{QueueReceiver, QueueSender};
use elevatorbank::network::SessionManager;
use elevatorbank::print;
use elevatorbank::supervision::heartbeat::HeartBeatManager;
use elevatorbank::supervision::restart::LoopHandle;
use elevatorbank::world_view::{Command, GlobalState, StateChange};

fn main() {
    init::init_logger();
    let settings = init::parse_args();

    if !settings.avoid_recovery {
        match init::run_supervised() {
            Ok(code) => process::exit(code),
            Err(e) => {
                error!("crash supervisor failed: {:#}", e);
                process::exit(1);
            }
        }
    }

    if let Err(e) = run_node(&settings) {
        error!("{:#}", e);
        process::exit(config::FATAL_EXIT_CODE);
    }
}

fn open_driver(settings: &Settings, bounds: Bounds) -> anyhow::Result<Driver> {
    let io: Box<dyn ElevatorIo> = if settings.simulator {
        info!("driving a simulated car with {} floors", settings.floors);
        Box::new(SimElevator::new(settings.floors, config::SIM_FLOOR_TRAVEL))
    } else {
        let server = ElevatorServer::init(&settings.server, settings.floors)
            .with_context(|| format!("could not reach the elevator server at {}", settings.server))?;
        Box::new(server)
    };
    Ok(Driver::new(io, bounds)?)
}

fn start_network(
    settings: &Settings,
    id: i32,
    queues: &SchedulerQueues,
    heartbeats: &mut HeartBeatManager,
) -> anyhow::Result<LoopHandle> {
    let net = settings.network;
    let terminate = Arc::new(AtomicBool::new(false));

    let command_sender = QueueSender::new(
        id,
        queues.commands_to_remote.clone(),
        SocketAddrV4::new(net.broadcast, net.command_port),
        terminate.clone(),
    )?
    .spawn("command-sender", heartbeats.get_new(config::NETWORK_HEARTBEAT))?;
    let command_receiver = QueueReceiver::new(
        id,
        queues.commands_to_local.clone(),
        net.command_port,
        move |command: &Command| command.is_for(id),
        terminate.clone(),
    )?
    .spawn("command-receiver", heartbeats.get_new(config::NETWORK_HEARTBEAT))?;
    let state_sender = QueueSender::new(
        id,
        queues.state_out.clone(),
        SocketAddrV4::new(net.broadcast, net.state_change_port),
        terminate.clone(),
    )?
    .spawn("state-sender", heartbeats.get_new(config::NETWORK_HEARTBEAT))?;
    let state_receiver = QueueReceiver::new(
        id,
        queues.state_in.clone(),
        net.state_change_port,
        |_: &StateChange| true,
        terminate.clone(),
    )?
    .spawn("state-receiver", heartbeats.get_new(config::NETWORK_HEARTBEAT))?;

    Ok(LoopHandle::new(
        terminate,
        vec![command_sender, command_receiver, state_sender, state_receiver],
    ))
}

fn start_printer(global_state: Arc<GlobalState>, bounds: Bounds) -> anyhow::Result<LoopHandle> {
    let terminate = Arc::new(AtomicBool::new(false));
    let thread = {
        let terminate = terminate.clone();
        thread::Builder::new().name("printer".to_string()).spawn(move || {
            while !terminate.load(Ordering::Relaxed) {
                print::global_state(&global_state, &bounds);
                thread::sleep(config::PRINT_STATE_PERIOD);
            }
        })?
    };
    Ok(LoopHandle::new(terminate, vec![thread]))
}

fn run_node(settings: &Settings) -> anyhow::Result<()> {
    let bounds = Bounds::with_floors(settings.floors);

    /* Session first, the id decides everything else */
    let session_manager = SessionManager::new(&settings.network).context("could not open the discovery sockets")?;
    let session = session_manager.discover(settings.nodes, settings.elevator_id)?;
    let id = session.id;

    let global_state = Arc::new(GlobalState::new());
    for state in &session.states {
        global_state.update(*state);
    }

    let mut heartbeats = HeartBeatManager::new();
    let queues = SchedulerQueues::default();

    /* Local car */
    let driver = open_driver(settings, bounds)?;
    let _elevator = {
        let mut elevator = Elevator::new(
            id,
            driver.clone(),
            queues.commands_to_local.clone(),
            queues.state_in.clone(),
            ElevatorTiming::default(),
        );
        if let Some(state) = session.recovered {
            info!("resuming from recovered state at floor {}", state.last_floor);
            elevator.recover(state);
        }
        elevator_logic::run_local_elevator(elevator, heartbeats.get_new(config::ELEVATOR_HEARTBEAT))?
    };

    /* Scheduler */
    let _scheduler = {
        let scheduler = Scheduler::new(id, bounds, global_state.clone(), queues.clone(), RequestTiming::default());
        scheduler.run(
            heartbeats.get_new(config::SCHEDULER_HEARTBEAT),
            heartbeats.get_new(config::SCHEDULER_HEARTBEAT),
        )?
    };

    /* Network */
    let _network = start_network(settings, id, &queues, &mut heartbeats)?;
    let _responder = session_manager
        .into_responder(&session, global_state.clone())
        .spawn(heartbeats.get_new(config::NETWORK_HEARTBEAT))?;

    let _printer = if settings.print_state {
        Some(start_printer(global_state.clone(), bounds)?)
    } else {
        None
    };

    info!("node {} running", id);
    thread::sleep(config::STARTUP_GRACE);
    if let Err(fault) = heartbeats.run_in_this_thread() {
        // a stuck thread would never join, leave without unwinding the handles
        error!("{}", fault);
        // the driver may be held by the stuck thread, never wait for it
        match driver.try_stop_elevator() {
            Ok(true) => {}
            Ok(false) => warn!("car connection busy, leaving without stopping the car"),
            Err(e) => error!("could not stop the car: {}", e),
        }
        process::exit(config::FATAL_EXIT_CODE);
    }
    Ok(())
}
