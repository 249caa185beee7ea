//! Client for the Heatmiser neoHub LAN JSON protocol.
//!
//! [`NeoHub`] owns one TCP connection to the hub and a cache of every
//! zone's merged `INFO` + `ENGINEERS_DATA` record. Thermostats and plugs
//! are handed out as [`Thermostat`] / [`RelayPlug`] views into that cache.

mod cache;
mod client;
pub mod codec;
mod config;
mod device;
mod diff;
mod error;
mod gateway;
mod logger;
pub mod protocol;
mod transport;
mod types;

pub use cache::{DeviceRecord, Snapshot, StateCache};
pub use client::{NeoHub, NeoHubBuilder};
pub use config::HubConfig;
pub use device::{DeviceKind, RelayPlug, Thermostat};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::{BoostInterval, Command, CommandSpec, Target};
pub use transport::{Transport, TransportState};
pub use types::*;
