//! # Session manager
//!
//! Runs once at startup, before any loop starts, and finds the peers of the
//! cluster. The node's id follows from the sorted peer set.
//!
//! ## Discovery
//! A sender thread broadcasts an [InitialAnnounce] or, once every expected
//! peer was seen, a [ReadyAnnounce]. The listener records who announced what:
//!
//! | Phase | Leaves when |
//! |-------|-------------|
//! | [Phase::Discovering] | `expected` distinct peers announced |
//! | [Phase::Ready] | `expected` peers announced ready, or a recovery hand-off arrived |
//! | [Phase::Done] | never |
//!
//! A recovery hand-off ([RecoveryState] or [RecoveryPeers]) comes from a node
//! that is already running and carries the whole peer set, which ends
//! discovery at once.
//!
//! ## Responder
//! After discovery the listening socket is handed to [Responder], which
//! answers announcements of known peers with a hand-off so a restarted node
//! rejoins with its last known state.

use std::collections::BTreeSet;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use log::{debug, info, warn};

use crate::config::{self, NetworkConfig};
use crate::error::Fault;
use crate::ip_help_functions::{id_from_peers, id_of, local_ipv4_addrs};
use crate::supervision::heartbeat::HeartBeat;
use crate::supervision::restart::{spawn_restarting, LoopHandle};
use crate::world_view::{Command, ElevatorState, GlobalState};

use super::packet::{InitialAnnounce, Packet, PacketType, ReadyAnnounce, RecoveryPeers, RecoveryState};
use super::udp_queue::broadcast_socket;

/// Discovery phase of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Collecting peers
    Discovering,
    /// Every peer seen, waiting for the others to see them too
    Ready,
    /// Peer set final
    Done,
}

/// Outcome of discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Id of this node
    pub id: i32,
    /// Every peer of the cluster
    pub peers: BTreeSet<Ipv4Addr>,
    /// Last state of this node's car known to the cluster
    pub recovered: Option<ElevatorState>,
    /// Car states handed over by a running peer
    pub states: Vec<ElevatorState>,
}

/// Discovery state machine, fed one packet at a time.
#[derive(Debug, Clone)]
pub struct Discovery {
    expected: usize,
    phase: Phase,
    peers: BTreeSet<Ipv4Addr>,
    barrier: BTreeSet<Ipv4Addr>,
    recovery: Option<RecoveryState>,
}

impl Discovery {
    /// Discovery of a cluster of `expected` nodes.
    pub fn new(expected: usize) -> Self {
        Self {
            expected: expected.max(1),
            phase: Phase::Discovering,
            peers: BTreeSet::new(),
            barrier: BTreeSet::new(),
            recovery: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Peers seen so far.
    pub fn peers(&self) -> &BTreeSet<Ipv4Addr> {
        &self.peers
    }

    /// Packet to broadcast in the current phase, `None` once done.
    pub fn announcement(&self) -> Result<Option<Packet>, Fault> {
        match self.phase {
            Phase::Discovering => Packet::new(Command::NO_ID, &InitialAnnounce).map(Some),
            Phase::Ready => Packet::new(Command::NO_ID, &ReadyAnnounce).map(Some),
            Phase::Done => Ok(None),
        }
    }

    /// Records a packet received from `from`.
    pub fn handle_packet(&mut self, from: Ipv4Addr, packet: &Packet) -> Result<(), Fault> {
        if self.phase == Phase::Done {
            return Ok(());
        }
        match packet.packet_type {
            PacketType::InitialAnnounce => {
                self.peers.insert(from);
            }
            PacketType::ReadyAnnounce => {
                self.peers.insert(from);
                self.barrier.insert(from);
            }
            PacketType::RecoveryState => {
                let recovery: RecoveryState = packet.message()?;
                info!("recovery hand-off from {} with {} peers", from, recovery.peers.len());
                self.peers = recovery.peers.clone();
                self.recovery = Some(recovery);
                self.phase = Phase::Done;
            }
            PacketType::RecoveryPeers => {
                let recovery: RecoveryPeers = packet.message()?;
                info!("peer hand-off from {} with {} peers", from, recovery.peers.len());
                self.peers = recovery.peers;
                self.phase = Phase::Done;
            }
            PacketType::Command | PacketType::StateChange => {
                debug!("ignoring {:?} from {} on the discovery port", packet.packet_type, from);
            }
        }
        self.advance();
        Ok(())
    }

    fn advance(&mut self) {
        if self.phase == Phase::Discovering && self.peers.len() >= self.expected {
            info!("discovered {} peers, ready", self.peers.len());
            self.phase = Phase::Ready;
        }
        if self.phase == Phase::Ready && self.barrier.len() >= self.expected {
            info!("every peer is ready");
            self.phase = Phase::Done;
        }
    }

    /// Assigns the node id and collects the recovered states.
    ///
    /// ## Parameters
    /// - `local`: addresses of this node
    /// - `id_override`: explicit id, used instead of the peer position
    ///
    /// ## Returns
    /// [Fault::NoNodeId] if there is no override and no peer is a local address.
    pub fn finish(self, local: &[Ipv4Addr], id_override: Option<i32>) -> Result<Session, Fault> {
        let id = match id_override {
            Some(id) => id,
            None => id_from_peers(&self.peers, local)?,
        };
        let (recovered, states) = match self.recovery {
            Some(recovery) if recovery.state.id == id => (Some(recovery.state), recovery.states),
            Some(recovery) => {
                warn!("recovered state belongs to elevator {}, not {}", recovery.state.id, id);
                (None, recovery.states)
            }
            None => (None, Vec::new()),
        };
        info!("session established, id = {}, peers = {:?}", id, self.peers);
        Ok(Session {
            id,
            peers: self.peers,
            recovered,
            states,
        })
    }
}

/// Reply of a running node to a packet on the discovery port.
///
/// Announcements of known peers get a [RecoveryState] when `global_state`
/// knows their car and a [RecoveryPeers] otherwise. Unknown addresses are
/// ignored, adding them would shift the ids of running nodes.
pub fn respond(
    from: Ipv4Addr,
    packet: &Packet,
    peers: &BTreeSet<Ipv4Addr>,
    global_state: &GlobalState,
    local_id: i32,
) -> Result<Option<Packet>, Fault> {
    if !matches!(packet.packet_type, PacketType::InitialAnnounce | PacketType::ReadyAnnounce) {
        return Ok(None);
    }
    let Some(id) = id_of(peers, from) else {
        warn!("announcement from unknown address {}, ignored", from);
        return Ok(None);
    };
    let reply = match global_state.get(id) {
        Some(state) => {
            info!("handing elevator {} its state back", id);
            let states = global_state
                .elevators_with_age()
                .into_iter()
                .map(|(state, _)| state)
                .collect();
            Packet::new(
                local_id,
                &RecoveryState {
                    state,
                    peers: peers.clone(),
                    states,
                },
            )?
        }
        None => Packet::new(local_id, &RecoveryPeers { peers: peers.clone() })?,
    };
    Ok(Some(reply))
}

/// Owner of the discovery sockets.
#[derive(Debug)]
pub struct SessionManager {
    listener: UdpSocket,
    sender: UdpSocket,
    broadcast: Ipv4Addr,
    port: u16,
    local_addrs: Vec<Ipv4Addr>,
}

fn lock(discovery: &Mutex<Discovery>) -> MutexGuard<'_, Discovery> {
    discovery.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl SessionManager {
    /// Binds the discovery sockets of `network`.
    pub fn new(network: &NetworkConfig) -> io::Result<Self> {
        let listener = broadcast_socket(network.discovery_port)?;
        let sender = broadcast_socket(network.discovery_send_port)?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            sender,
            broadcast: network.broadcast,
            port,
            local_addrs: local_ipv4_addrs(),
        })
    }

    /// Runs discovery until the peer set is final.
    ///
    /// Blocks the calling thread, announcements go out from a scoped thread.
    pub fn discover(&self, expected: usize, id_override: Option<i32>) -> Result<Session, Fault> {
        let discovery = Mutex::new(Discovery::new(expected));
        let stop = AtomicBool::new(false);
        self.listener
            .set_read_timeout(Some(config::DISCOVERY_LISTEN_TIMEOUT))?;

        thread::scope(|scope| {
            scope.spawn(|| self.announce(&discovery, &stop));
            let result = self.listen(&discovery);
            stop.store(true, Ordering::Relaxed);
            result
        })?;

        let discovery = discovery
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        discovery.finish(&self.local_addrs, id_override)
    }

    fn announce(&self, discovery: &Mutex<Discovery>, stop: &AtomicBool) {
        let destination = SocketAddrV4::new(self.broadcast, self.port);
        while !stop.load(Ordering::Relaxed) {
            let packet = match lock(discovery).announcement() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    warn!("could not build announcement: {}", e);
                    break;
                }
            };
            match packet.encode() {
                Ok(bytes) => {
                    if let Err(e) = self.sender.send_to(&bytes, destination) {
                        warn!("announcement to {} failed: {}", destination, e);
                    }
                }
                Err(e) => warn!("could not encode announcement: {}", e),
            }
            thread::sleep(config::ANNOUNCE_PERIOD);
        }
    }

    fn listen(&self, discovery: &Mutex<Discovery>) -> Result<(), Fault> {
        let mut buf = vec![0u8; config::UDP_BUFFER];
        while lock(discovery).phase() != Phase::Done {
            let (len, from) = match self.listener.recv_from(&mut buf) {
                Ok((len, SocketAddr::V4(from))) => (len, *from.ip()),
                Ok(_) => continue,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e.into()),
            };
            let handled = Packet::decode(&buf[..len]).and_then(|packet| lock(discovery).handle_packet(from, &packet));
            if let Err(e) = handled {
                warn!("dropping discovery packet from {}: {}", from, e);
            }
        }
        Ok(())
    }

    /// Turns the listening socket into a [Responder] for later joiners.
    pub fn into_responder(self, session: &Session, global_state: Arc<GlobalState>) -> Responder {
        Responder {
            socket: self.listener,
            port: self.port,
            peers: session.peers.clone(),
            local_id: session.id,
            global_state,
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Answers announcements of nodes joining a running cluster.
#[derive(Debug)]
pub struct Responder {
    socket: UdpSocket,
    port: u16,
    peers: BTreeSet<Ipv4Addr>,
    local_id: i32,
    global_state: Arc<GlobalState>,
    terminate: Arc<AtomicBool>,
}

impl Responder {
    /// Answers until terminated, beating `heartbeat` at least every half threshold.
    pub fn run(&self, heartbeat: &HeartBeat) -> Result<(), Fault> {
        self.socket.set_read_timeout(Some(heartbeat.threshold() / 2))?;
        let mut buf = vec![0u8; config::UDP_BUFFER];
        while !self.terminate.load(Ordering::Relaxed) {
            heartbeat.beat();
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok((len, SocketAddr::V4(from))) => (len, *from.ip()),
                Ok(_) => continue,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e.into()),
            };
            let packet = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("dropping discovery packet from {}: {}", from, e);
                    continue;
                }
            };
            if let Some(reply) = respond(from, &packet, &self.peers, &self.global_state, self.local_id)? {
                let destination = SocketAddrV4::new(from, self.port);
                if let Err(e) = self.socket.send_to(&reply.encode()?, destination) {
                    warn!("hand-off to {} failed: {}", destination, e);
                }
            }
        }
        Ok(())
    }

    /// Runs the responder on its own restarting thread.
    pub fn spawn(self, heartbeat: Arc<HeartBeat>) -> io::Result<LoopHandle> {
        let terminate = self.terminate.clone();
        let thread = spawn_restarting("session-responder", move || self.run(&heartbeat))?;
        Ok(LoopHandle::new(terminate, vec![thread]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevio::Bounds;

    fn addr(a: &str) -> Ipv4Addr {
        a.parse().unwrap()
    }

    fn initial() -> Packet {
        Packet::new(Command::NO_ID, &InitialAnnounce).unwrap()
    }

    fn ready() -> Packet {
        Packet::new(Command::NO_ID, &ReadyAnnounce).unwrap()
    }

    #[test]
    fn two_nodes_pass_both_barriers() {
        let mut d = Discovery::new(2);
        assert_eq!(d.announcement().unwrap().unwrap().packet_type, PacketType::InitialAnnounce);
        d.handle_packet(addr("10.0.0.2"), &initial()).unwrap();
        assert_eq!(d.phase(), Phase::Discovering);
        d.handle_packet(addr("10.0.0.1"), &initial()).unwrap();
        assert_eq!(d.phase(), Phase::Ready);
        assert_eq!(d.announcement().unwrap().unwrap().packet_type, PacketType::ReadyAnnounce);
        d.handle_packet(addr("10.0.0.2"), &ready()).unwrap();
        assert_eq!(d.phase(), Phase::Ready);
        d.handle_packet(addr("10.0.0.1"), &ready()).unwrap();
        assert_eq!(d.phase(), Phase::Done);
        assert!(d.announcement().unwrap().is_none());

        let session = d.finish(&[addr("10.0.0.2")], None).unwrap();
        assert_eq!(session.id, 1);
        assert!(session.recovered.is_none());
    }

    #[test]
    fn ready_peer_counts_as_discovered() {
        let mut d = Discovery::new(2);
        d.handle_packet(addr("10.0.0.1"), &ready()).unwrap();
        d.handle_packet(addr("10.0.0.2"), &ready()).unwrap();
        assert_eq!(d.phase(), Phase::Done);
    }

    #[test]
    fn peer_hand_off_ends_discovery() {
        let mut d = Discovery::new(3);
        d.handle_packet(addr("10.0.0.9"), &initial()).unwrap();
        let peers: BTreeSet<Ipv4Addr> = [addr("10.0.0.1"), addr("10.0.0.5"), addr("10.0.0.9")].into();
        let handoff = Packet::new(0, &RecoveryPeers { peers: peers.clone() }).unwrap();
        d.handle_packet(addr("10.0.0.1"), &handoff).unwrap();
        assert_eq!(d.phase(), Phase::Done);
        // late announcements no longer change the peer set
        d.handle_packet(addr("10.0.0.77"), &initial()).unwrap();
        assert_eq!(d.peers(), &peers);
        assert_eq!(d.finish(&[addr("10.0.0.9")], None).unwrap().id, 2);
    }

    #[test]
    fn id_override_wins_and_missing_id_is_fatal() {
        let mut d = Discovery::new(1);
        d.handle_packet(addr("10.0.0.4"), &initial()).unwrap();
        d.handle_packet(addr("10.0.0.4"), &ready()).unwrap();
        assert_eq!(d.clone().finish(&[], Some(7)).unwrap().id, 7);
        assert!(matches!(d.finish(&[addr("10.0.0.8")], None), Err(Fault::NoNodeId)));
    }

    #[test]
    fn responder_hands_back_known_state() {
        let bounds = Bounds::with_floors(4);
        let peers: BTreeSet<Ipv4Addr> = [addr("10.0.0.1"), addr("10.0.0.2")].into();
        let gs = GlobalState::new();
        let mut old = ElevatorState::new(1, &bounds);
        old.last_floor = 3;
        gs.update(old);
        gs.update(ElevatorState::new(0, &bounds));

        let reply = respond(addr("10.0.0.2"), &ready(), &peers, &gs, 0).unwrap().unwrap();
        let handoff: RecoveryState = reply.message().unwrap();
        assert_eq!(handoff.state, old);
        assert_eq!(handoff.peers, peers);
        assert_eq!(handoff.states.len(), 2);

        let fresh = GlobalState::new();
        let reply = respond(addr("10.0.0.2"), &initial(), &peers, &fresh, 0).unwrap().unwrap();
        assert_eq!(reply.packet_type, PacketType::RecoveryPeers);
    }

    #[test]
    fn responder_ignores_strangers_and_other_traffic() {
        let peers: BTreeSet<Ipv4Addr> = [addr("10.0.0.1")].into();
        let gs = GlobalState::new();
        assert!(respond(addr("10.0.0.66"), &initial(), &peers, &gs, 0).unwrap().is_none());
        let handoff = Packet::new(0, &RecoveryPeers { peers: peers.clone() }).unwrap();
        assert!(respond(addr("10.0.0.1"), &handoff, &peers, &gs, 0).unwrap().is_none());
    }

    #[test]
    fn single_node_discovers_itself_over_loopback() {
        let network = NetworkConfig {
            broadcast: Ipv4Addr::LOCALHOST,
            discovery_send_port: 0,
            discovery_port: 0,
            ..NetworkConfig::default()
        };
        let mut manager = SessionManager::new(&network).unwrap();
        manager.local_addrs = vec![Ipv4Addr::LOCALHOST];
        let session = manager.discover(1, None).unwrap();
        assert_eq!(session.id, 0);
        assert!(session.peers.contains(&Ipv4Addr::LOCALHOST));
    }
}
