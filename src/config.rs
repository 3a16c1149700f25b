//! # config.rs – Centralized Parameter Store
//!
//! This module holds all static program parameters used throughout the system,
//! plus the runtime [Settings] assembled from the command line in [crate::init].
//! Keeping configuration in one place makes tuning, experimentation, and testing easier.

use std::net::Ipv4Addr;
use std::time::Duration;

//
// ──────────────────────────────────────────────────────────────
//   1. NETWORK SETTINGS
// ──────────────────────────────────────────────────────────────
//

/// Bind address used by every UDP socket
pub const BC_LISTEN_ADDR: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Broadcast address used for system-wide traffic
pub const BC_ADDR: Ipv4Addr = Ipv4Addr::BROADCAST;

/// Port the session manager sends discovery announcements from
pub const DISCOVERY_SEND_PORT: u16 = 64032;

/// Port the session manager listens on (announcements and recovery hand-offs)
pub const DISCOVERY_PORT: u16 = 64033;

/// Port commands are distributed on
pub const COMMAND_PORT: u16 = 64034;

/// Port state changes are distributed on
pub const STATE_CHANGE_PORT: u16 = 64036;

/// Size of UDP receive buffer in bytes
pub const UDP_BUFFER: usize = u16::MAX as usize;

/// Default address of the elevator server (simulator or lab hardware bridge)
pub const LOCAL_ELEV_ADDR: &str = "localhost:15657";

//
// ──────────────────────────────────────────────────────────────
//   2. SYSTEM & ELEVATOR PARAMETERS
// ──────────────────────────────────────────────────────────────
//

/// Default number of floors in the lab setup
pub const DEFAULT_NUM_FLOORS: u8 = 4;

/// Lowest floor number, floors are labelled from 1 like on the panels
pub const MIN_FLOOR: i32 = 1;

/// Motor speed used whenever the car moves
pub const MOTOR_SPEED: i32 = 300;

/// Upper bound on floors a [crate::utils::floor_set::FloorSet] can hold
pub const MAX_FLOORS: i32 = 64;

/// Exit status of the process after a fatal fault
pub const FATAL_EXIT_CODE: i32 = 2;

//
// ──────────────────────────────────────────────────────────────
//   3. TIMING & TIMEOUTS & INTERVALS
// ──────────────────────────────────────────────────────────────
//

/// Pause between two control loop cycles
pub const ELEV_POLL: Duration = Duration::from_millis(10);

/// Maximum time between two state change packets from one car
pub const KEEP_ALIVE: Duration = Duration::from_millis(500);

/// How long the doors stay open waiting for an inside button
pub const DOOR_WAIT: Duration = Duration::from_millis(5000);

/// Heartbeat threshold of the elevator control loop
pub const ELEVATOR_HEARTBEAT: Duration = Duration::from_millis(500);

/// Heartbeat threshold of the scheduler loops
pub const SCHEDULER_HEARTBEAT: Duration = Duration::from_millis(1000);

/// Heartbeat threshold of the session responder and the UDP queues
pub const NETWORK_HEARTBEAT: Duration = Duration::from_millis(2000);

/// Time the threads get to start beating before heartbeats are checked
pub const STARTUP_GRACE: Duration = Duration::from_secs(2);

/// Deadline of a freshly issued call, a fast acknowledgment is expected
pub const REQUEST_ACK_DEADLINE: Duration = Duration::from_millis(100);

/// Deadline of a call the target car has accepted, serving it takes time
pub const REQUEST_SERVE_DEADLINE: Duration = Duration::from_secs(30);

/// Read and write timeout on the elevator server connection, below [ELEVATOR_HEARTBEAT]
pub const ELEV_IO_TIMEOUT: Duration = Duration::from_millis(250);

/// Travel time between two floors of the `--simulator` car
pub const SIM_FLOOR_TRAVEL: Duration = Duration::from_millis(2000);

/// Resends to the same car before the call is reassigned
pub const REQUEST_REPEAT_BOUND: u32 = 3;

/// Car state older than this is presumed dead and never assigned
pub const DEAD_THRESHOLD: Duration = Duration::from_millis(3 * 500);

/// Car state older than this is penalised as outdated
pub const OUTDATED_THRESHOLD: Duration = Duration::from_millis(750);

/// Interval between discovery announcements
pub const ANNOUNCE_PERIOD: Duration = Duration::from_millis(500);

/// Receive timeout of the discovery listener
pub const DISCOVERY_LISTEN_TIMEOUT: Duration = Duration::from_millis(300);

/// Interval of the optional global state printer
pub const PRINT_STATE_PERIOD: Duration = Duration::from_millis(1000);

/// Delay before the crash supervisor respawns a failed node
pub const RESPAWN_DELAY: Duration = Duration::from_millis(500);

//
// ──────────────────────────────────────────────────────────────
//   4. RUNTIME SETTINGS
// ──────────────────────────────────────────────────────────────
//

/// Timing of the elevator control loop.
///
/// Production uses [ElevatorTiming::default], tests shorten the door wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElevatorTiming {
    /// Pause between two cycles
    pub poll: Duration,
    /// Maximum silence before a keep-alive is emitted
    pub keep_alive: Duration,
    /// Door open time when no inside button is pressed
    pub door_wait: Duration,
}

impl Default for ElevatorTiming {
    fn default() -> Self {
        Self {
            poll: ELEV_POLL,
            keep_alive: KEEP_ALIVE,
            door_wait: DOOR_WAIT,
        }
    }
}

/// Settings of one node, filled from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Expected number of nodes in the cluster
    pub nodes: usize,
    /// Run in the foreground without the crash supervisor
    pub avoid_recovery: bool,
    /// Explicit node id, skips id assignment by discovery
    pub elevator_id: Option<i32>,
    /// Address of the elevator server
    pub server: String,
    /// Number of floors served by the car
    pub floors: u8,
    /// Drive an in-memory simulated car instead of the elevator server
    pub simulator: bool,
    /// Periodically print the global state table
    pub print_state: bool,
    /// Addresses of the UDP channels
    pub network: NetworkConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nodes: 1,
            avoid_recovery: false,
            elevator_id: None,
            server: LOCAL_ELEV_ADDR.to_string(),
            floors: DEFAULT_NUM_FLOORS,
            simulator: false,
            print_state: false,
            network: NetworkConfig::default(),
        }
    }
}

/// Destination address and ports of the node's UDP channels.
///
/// Every channel uses its own port so traffic of one kind never reaches a
/// receiver of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Destination of broadcast traffic
    pub broadcast: Ipv4Addr,
    /// Source port of discovery announcements and recovery hand-offs
    pub discovery_send_port: u16,
    /// Port the session manager listens on
    pub discovery_port: u16,
    /// Port commands are distributed on
    pub command_port: u16,
    /// Port state changes are distributed on
    pub state_change_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            broadcast: BC_ADDR,
            discovery_send_port: DISCOVERY_SEND_PORT,
            discovery_port: DISCOVERY_PORT,
            command_port: COMMAND_PORT,
            state_change_port: STATE_CHANGE_PORT,
        }
    }
}
