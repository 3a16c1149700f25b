#![warn(missing_docs)]
//! # This projects library
//!
//! A bank of elevator cars, one node per car, which share the hall calls
//! among themselves over broadcast UDP. There is no master: every node runs
//! its own scheduler on a merged view of all cars, and a node that crashes
//! is restarted and picks up its last known state from a peer.
//!
//! ## Overview
//! - **config**: Static parameters and the runtime settings.
//! - **error**: Recoverable and fatal faults.
//! - **init**: Command line, logging and the crash supervisor.
//! - **ip_help_functions**: Local addresses and node ids from the peer set.
//! - **print**: Table print of the global state.
//! - **utils**: Floor sets, queues and the node clock.
//! - **supervision**: Heartbeats and the restart wrapper.
//! - **elevio**: Interface for elevator I/O.
//! - **world_view**: Car states, state changes, commands and the merged global state.
//! - **elevator_logic**: The control loop of the local car.
//! - **manager**: Assigns hall calls to cars and follows them up.
//! - **network**: Wire format, UDP queues and the session manager.

pub mod config;

pub mod error;

pub mod init;

pub mod ip_help_functions;

pub mod print;

pub mod utils;

pub mod supervision;

pub mod elevio;

pub mod world_view;

pub mod elevator_logic;

pub mod manager;

pub mod network;
