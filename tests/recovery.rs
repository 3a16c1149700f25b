//! A node rejoining a running cluster gets its peers, its own last state
//! and the states of the other cars from the first answer to its announcement.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use elevatorbank::config::ElevatorTiming;
use elevatorbank::elevator_logic::Elevator;
use elevatorbank::elevio::sim::SimElevator;
use elevatorbank::elevio::{Bounds, ButtonType, Direction, Driver};
use elevatorbank::network::packet::{InitialAnnounce, Packet, PacketType};
use elevatorbank::network::session::{respond, Discovery, Phase};
use elevatorbank::utils::blocking_queue::BlockingQueue;
use elevatorbank::world_view::{Command, ElevatorState, GlobalState};

const NODE_A: Ipv4Addr = Ipv4Addr::new(10, 100, 23, 11);
const NODE_B: Ipv4Addr = Ipv4Addr::new(10, 100, 23, 12);

fn running_cluster(bounds: &Bounds) -> (BTreeSet<Ipv4Addr>, GlobalState) {
    let peers: BTreeSet<Ipv4Addr> = [NODE_A, NODE_B].into();
    let gs = GlobalState::new();

    let mut a = ElevatorState::new(0, bounds);
    a.last_floor = 3;
    a.direction = Direction::Up;
    gs.update(a);

    let mut b = ElevatorState::new(1, bounds);
    b.last_floor = 2;
    b.inside_buttons.set(true, 4, bounds).unwrap();
    gs.update(b);
    (peers, gs)
}

#[test]
fn rejoining_node_recovers_cluster_view() {
    let bounds = Bounds::with_floors(4);
    let (peers, cluster) = running_cluster(&bounds);

    // B restarted and announces itself, it only knows about itself yet
    let mut discovery = Discovery::new(2);
    let announce = Packet::new(Command::NO_ID, &InitialAnnounce).unwrap();
    discovery.handle_packet(NODE_B, &announce).unwrap();
    assert_eq!(discovery.phase(), Phase::Discovering);

    let reply = respond(NODE_B, &announce, &peers, &cluster, 0).unwrap().unwrap();
    assert_eq!(reply.packet_type, PacketType::RecoveryState);
    let wire = Packet::decode(&reply.encode().unwrap()).unwrap();
    discovery.handle_packet(NODE_A, &wire).unwrap();
    assert_eq!(discovery.phase(), Phase::Done);

    let session = discovery.finish(&[NODE_B], None).unwrap();
    assert_eq!(session.id, 1);
    assert_eq!(session.peers, peers);

    let view = GlobalState::new();
    for state in &session.states {
        view.update(*state);
    }
    let a = view.get(0).unwrap();
    assert_eq!(a.last_floor, 3);
    assert_eq!(a.direction, Direction::Up);

    let own = session.recovered.unwrap();
    assert_eq!(own.last_floor, 2);
    assert!(own.inside_buttons.get(4, &bounds).unwrap());
}

#[test]
fn recovered_inside_calls_light_up_again() {
    let bounds = Bounds::with_floors(4);
    let (_, cluster) = running_cluster(&bounds);
    let recovered = cluster.get(1).unwrap();

    let sim = SimElevator::new(4, Duration::from_millis(100));
    let car = sim.handle();
    car.place_at(1);
    let driver = Driver::new(Box::new(sim), bounds).unwrap();
    let mut elevator = Elevator::new(
        1,
        driver,
        BlockingQueue::new(),
        BlockingQueue::new(),
        ElevatorTiming::default(),
    );
    elevator.recover(recovered);
    let _loop_state = elevator.start_loop().unwrap();

    assert!(car.lamp(ButtonType::INSIDE, 3));
    assert!(!car.lamp(ButtonType::UP, 1));
    assert_eq!(elevator.state().direction, Direction::None);
    assert_eq!(elevator.state().last_floor, 2);
}

#[test]
fn newcomer_gets_peers_only() {
    let bounds = Bounds::with_floors(4);
    let (peers, _) = running_cluster(&bounds);
    let empty = GlobalState::new();
    let announce = Packet::new(Command::NO_ID, &InitialAnnounce).unwrap();

    let reply = respond(NODE_B, &announce, &peers, &empty, 0).unwrap().unwrap();
    let mut discovery = Discovery::new(2);
    discovery.handle_packet(NODE_A, &reply).unwrap();
    let session = discovery.finish(&[NODE_B], None).unwrap();
    assert_eq!(session.id, 1);
    assert!(session.recovered.is_none());
    assert!(session.states.is_empty());
}
