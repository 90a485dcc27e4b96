//! # PCB Debugger Bench Controller
//!
//! Drives a lab bench (a three-channel programmable power supply and a
//! multimeter) through a small line-oriented command language.
//!
//! ## Features
//!
//! - **Command language**: four-character keywords such as `SETV 1,3.3`,
//!   `GETV1`, `TSTR`
//! - **Per-command error containment**: every line yields exactly one result
//!   string, failures included, and never aborts the batch
//! - **Pluggable transport**: SCPI over raw TCP sockets, or an in-memory
//!   simulated bench
//! - **Batch server**: newline-delimited JSON over TCP
//!
//! ## Quick Start
//!
//! ```rust
//! use pcbdbg::{BatchProcessor, SimulatedBench};
//!
//! let mut processor = BatchProcessor::new(SimulatedBench::new());
//! let responses = processor.process(&["SETV 1,3.3", "GETV1", "FOOB"]);
//!
//! assert_eq!(responses[0], "Channel 1 Voltage set to 3.3");
//! assert_eq!(responses[1], "Voltage at channel 1: 3.300");
//! assert_eq!(responses[2], "Error processing command 'FOOB': command not found");
//! ```
//!
//! ## Architecture
//!
//! - [`batch`] - Ordered batch processing and statistics
//! - [`dispatcher`] - Keyword → handler table
//! - [`command`] - Command grammar, parser and error taxonomy
//! - [`devices`] - Power supply and multimeter operations
//! - [`session`] - Instrument sessions and connectors
//! - [`simulator`] - Simulated bench
//! - [`protocol`] - JSON-lines wire format
//! - [`server`] - TCP batch server
//! - [`config`] - Bench configuration

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod batch;
pub mod command;
pub mod config;
pub mod devices;
pub mod dispatcher;
pub mod protocol;
pub mod server;
pub mod session;
pub mod simulator;

// Re-export main public types for convenience
pub use batch::{BatchProcessor, BatchStats};
pub use command::{parse_line, CommandError, ErrorKind, Keyword, ParsedCommand};
pub use config::BenchConfig;
pub use dispatcher::Dispatcher;
pub use session::{Connector, InstrumentKind, InstrumentSession, SessionError, TcpConnector};
pub use simulator::SimulatedBench;
