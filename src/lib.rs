#![warn(rust_2018_idioms)]
//! Shared single-file logging for a family of local processes.
//!
//! The first process started for an instance name becomes the aggregator:
//! it binds the instance's channel, owns `datalog/<name>_log.txt` and fans
//! every follower's records into it. Later processes find the channel,
//! join as followers and relay their records instead of writing locally.
//! If the aggregator exits, followers stop forwarding; nothing re-elects.

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod election;
pub mod hook;
pub mod relay;
pub mod server;
pub mod sink;
pub mod wire;

pub use config::CoordinatorConfig;
pub use coordinator::{LogCoordinator, acquire, release};
pub use domain::{CoordinatorError, LogEvent, LogRecord, Role, Severity};
pub use hook::{LogLayer, install_global};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
