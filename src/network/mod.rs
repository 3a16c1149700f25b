//! # Network
//!
//! Communication between nodes, all of it over broadcast UDP.
//!
//! ## Overview
//! - [packet]: the message catalog and its wire encoding.
//! - [udp_queue]: senders and receivers moving messages between local queues and the network.
//! - [session]: peer discovery, id assignment and recovery hand-offs at startup.
//!
//! Each kind of traffic has its own port, see [crate::config::NetworkConfig].

pub mod packet;
pub mod session;
pub mod udp_queue;

pub use packet::{Message, Packet, PacketType};
pub use session::{Session, SessionManager};
