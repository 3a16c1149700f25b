//! ## UDP queues
//!
//! Bridges a [BlockingQueue] to a broadcast UDP port and back.
//!
//! - [QueueSender] drains a local queue and broadcasts every message.
//! - [QueueReceiver] listens on the port and fills a local queue, skipping
//!   the node's own broadcasts and anything the acceptance predicate rejects.
//!
//! Delivery is best effort. A failed send is logged and dropped, recovering
//! lost commands is the job of the request deadlines in [crate::manager].

use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, warn};
use socket2::{Domain, Socket, Type};

use crate::config;
use crate::error::Fault;
use crate::supervision::heartbeat::HeartBeat;
use crate::supervision::restart::spawn_restarting;
use crate::utils::blocking_queue::BlockingQueue;

use super::packet::{Message, Packet};

/// Opens a UDP socket bound to `port` on every interface, with address reuse
/// and broadcast enabled. Port 0 picks a free port.
pub fn broadcast_socket(port: u16) -> io::Result<UdpSocket> {
    let addr = SocketAddr::V4(SocketAddrV4::new(config::BC_LISTEN_ADDR, port));
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Broadcasts the messages of a local queue.
#[derive(Debug)]
pub struct QueueSender<M> {
    socket: UdpSocket,
    destination: SocketAddrV4,
    local_id: i32,
    queue: BlockingQueue<M>,
    terminate: Arc<AtomicBool>,
}

impl<M: Message + Send + 'static> QueueSender<M> {
    /// Sender of node `local_id` draining `queue` to `destination`.
    pub fn new(
        local_id: i32,
        queue: BlockingQueue<M>,
        destination: SocketAddrV4,
        terminate: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        Ok(Self {
            socket: broadcast_socket(0)?,
            destination,
            local_id,
            queue,
            terminate,
        })
    }

    /// Sends one message, returns whether it left the node.
    pub fn send(&self, message: &M) -> Result<bool, Fault> {
        let bytes = Packet::new(self.local_id, message)?.encode()?;
        match self.socket.send_to(&bytes, self.destination) {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("udp send to {} failed: {}", self.destination, e);
                Ok(false)
            }
        }
    }

    /// Sends until terminated, beating `heartbeat` at least every half threshold.
    pub fn run(&self, heartbeat: &HeartBeat) -> Result<(), Fault> {
        while !self.terminate.load(Ordering::Relaxed) {
            if let Some(message) = self.queue.timeout_dequeue(heartbeat.threshold() / 2) {
                self.send(&message)?;
            }
            heartbeat.beat();
        }
        Ok(())
    }

    /// Runs the sender on its own restarting thread.
    pub fn spawn(self, name: &str, heartbeat: Arc<HeartBeat>) -> io::Result<JoinHandle<()>> {
        spawn_restarting(name, move || self.run(&heartbeat))
    }
}

/// Fills a local queue from a UDP port.
pub struct QueueReceiver<M> {
    socket: UdpSocket,
    local_id: i32,
    queue: BlockingQueue<M>,
    accept: Box<dyn Fn(&M) -> bool + Send>,
    terminate: Arc<AtomicBool>,
}

impl<M: Message + Send + 'static> QueueReceiver<M> {
    /// Receiver of node `local_id` listening on `port`, keeping what `accept` approves.
    pub fn new<F>(
        local_id: i32,
        queue: BlockingQueue<M>,
        port: u16,
        accept: F,
        terminate: Arc<AtomicBool>,
    ) -> io::Result<Self>
    where
        F: Fn(&M) -> bool + Send + 'static,
    {
        Ok(Self {
            socket: broadcast_socket(port)?,
            local_id,
            queue,
            accept: Box::new(accept),
            terminate,
        })
    }

    /// Handles one datagram, returns whether it was queued.
    pub fn receive(&self, bytes: &[u8]) -> bool {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("dropping malformed datagram: {}", e);
                return false;
            }
        };
        if packet.origin == self.local_id {
            return false;
        }
        match packet.message::<M>() {
            Ok(message) if (self.accept)(&message) => {
                self.queue.enqueue(message);
                true
            }
            Ok(_) => false,
            Err(e) => {
                debug!("dropping packet from node {}: {}", packet.origin, e);
                false
            }
        }
    }

    /// Receives until terminated, beating `heartbeat` at least every half threshold.
    pub fn run(&self, heartbeat: &HeartBeat) -> Result<(), Fault> {
        self.socket.set_read_timeout(Some(heartbeat.threshold() / 2))?;
        let mut buf = vec![0u8; config::UDP_BUFFER];
        while !self.terminate.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, _)) => {
                    self.receive(&buf[..len]);
                }
                Err(e) if is_timeout(&e) => {}
                Err(e) => return Err(e.into()),
            }
            heartbeat.beat();
        }
        Ok(())
    }

    /// Runs the receiver on its own restarting thread.
    pub fn spawn(self, name: &str, heartbeat: Arc<HeartBeat>) -> io::Result<JoinHandle<()>> {
        spawn_restarting(name, move || self.run(&heartbeat))
    }
}
