//! ## Packets
//!
//! Every datagram is one bincode encoded [Packet]: a type tag, the id of the
//! sending node and the bincode encoded message. The tag lets a receiver
//! reject traffic of another kind before decoding the payload.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Fault;
use crate::fault_unless;
use crate::world_view::{Command, ElevatorState, StateChange};

/// Type tag of a [Packet].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// [Command]
    Command,
    /// [StateChange]
    StateChange,
    /// [InitialAnnounce]
    InitialAnnounce,
    /// [ReadyAnnounce]
    ReadyAnnounce,
    /// [RecoveryState]
    RecoveryState,
    /// [RecoveryPeers]
    RecoveryPeers,
}

/// A message that can travel in a [Packet].
pub trait Message: Serialize + DeserializeOwned {
    /// Tag of packets carrying this message
    const TYPE: PacketType;
}

impl Message for Command {
    const TYPE: PacketType = PacketType::Command;
}

impl Message for StateChange {
    const TYPE: PacketType = PacketType::StateChange;
}

/// "I exist", sent during the first discovery phase.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitialAnnounce;

impl Message for InitialAnnounce {
    const TYPE: PacketType = PacketType::InitialAnnounce;
}

/// "I have seen every peer", sent during the second discovery phase.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadyAnnounce;

impl Message for ReadyAnnounce {
    const TYPE: PacketType = PacketType::ReadyAnnounce;
}

/// Hand-off to a node that rejoins a running cluster.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecoveryState {
    /// Last known state of the receiving node's car
    pub state: ElevatorState,
    /// Every peer of the cluster
    pub peers: BTreeSet<Ipv4Addr>,
    /// Every car state the sender knows
    pub states: Vec<ElevatorState>,
}

impl Message for RecoveryState {
    const TYPE: PacketType = PacketType::RecoveryState;
}

/// Hand-off to a node the cluster has no state for.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPeers {
    /// Every peer of the cluster
    pub peers: BTreeSet<Ipv4Addr>,
}

impl Message for RecoveryPeers {
    const TYPE: PacketType = PacketType::RecoveryPeers;
}

/// Envelope of every datagram.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// What the payload holds
    pub packet_type: PacketType,
    /// Id of the sending node, [Command::NO_ID] before it has one
    pub origin: i32,
    /// Encoded message
    pub payload: Vec<u8>,
}

impl Packet {
    /// Wraps `message` sent by node `origin`.
    pub fn new<M: Message>(origin: i32, message: &M) -> Result<Self, Fault> {
        Ok(Self {
            packet_type: M::TYPE,
            origin,
            payload: bincode::serialize(message)?,
        })
    }

    /// Decodes the payload as `M`.
    ///
    /// ## Returns
    /// A recoverable fault if the packet carries another message type or
    /// the payload is malformed.
    pub fn message<M: Message>(&self) -> Result<M, Fault> {
        fault_unless!(self.packet_type == M::TYPE, "packet carries another message type");
        Ok(bincode::deserialize(&self.payload)?)
    }

    /// Datagram bytes of the packet.
    pub fn encode(&self) -> Result<Vec<u8>, Fault> {
        Ok(bincode::serialize(self)?)
    }

    /// Packet of a received datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, Fault> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevio::{Bounds, Direction};
    use crate::world_view::{ChangeType, CommandType};

    #[test]
    fn state_change_survives_the_wire() {
        let mut state = ElevatorState::new(2, &Bounds::with_floors(4));
        state.direction = Direction::Down;
        state.last_floor = 3;
        state.up_buttons.set(true, 2, &Bounds::with_floors(4)).unwrap();
        let change = StateChange::new(ChangeType::ButtonUpPressed, 2, state);

        let bytes = Packet::new(2, &change).unwrap().encode().unwrap();
        let packet = Packet::decode(&bytes).unwrap();
        assert_eq!(packet.origin, 2);
        assert_eq!(packet.packet_type, PacketType::StateChange);
        assert_eq!(packet.message::<StateChange>().unwrap(), change);
    }

    #[test]
    fn recovery_state_carries_peers_and_states() {
        let bounds = Bounds::with_floors(4);
        let peers: BTreeSet<Ipv4Addr> = ["10.0.0.1", "10.0.0.2"].iter().map(|a| a.parse().unwrap()).collect();
        let msg = RecoveryState {
            state: ElevatorState::new(1, &bounds),
            peers: peers.clone(),
            states: vec![ElevatorState::new(0, &bounds), ElevatorState::new(1, &bounds)],
        };
        let packet = Packet::decode(&Packet::new(0, &msg).unwrap().encode().unwrap()).unwrap();
        let back: RecoveryState = packet.message().unwrap();
        assert_eq!(back.peers, peers);
        assert_eq!(back.states.len(), 2);
    }

    #[test]
    fn wrong_message_type_is_rejected() {
        let cmd = Command::new(CommandType::TurnOnLightUp, Command::ANY_ID, 2);
        let packet = Packet::new(0, &cmd).unwrap();
        let err = packet.message::<StateChange>().unwrap_err();
        assert!(err.is_recoverable());
        assert!(packet.message::<InitialAnnounce>().is_err());
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(matches!(Packet::decode(&[0xff; 3]), Err(Fault::Codec(_))));
    }
}
