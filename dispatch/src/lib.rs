//! # ExDevice Dispatcher
//!
//! This library drives [`exdevice_protocol`] codecs against a connected BLE
//! peripheral. It handles:
//!
//! - Throttled writes to the send characteristic
//! - Request/reply matching for host-initiated commands
//! - Routing of device-initiated events to the registered listener
//! - Reassembly of frames split over several notifications
//! - Bookkeeping of all connected sessions
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Application (platform)                      │
//! │                                                                 │
//! │  ┌──────────────────┐          ┌────────────────────────────┐  │
//! │  │ DeviceController │─────────►│ Dispatcher (per device)    │  │
//! │  │  sessions by MAC │          │                            │  │
//! │  └──────────────────┘          │  ┌───────┐  ┌───────────┐  │  │
//! │                                │  │ Codec │  │ Throttle  │  │  │
//! │                                │  └───────┘  └───────────┘  │  │
//! │                                └─────────────┬──────────────┘  │
//! │                                              │ BleTransport     │
//! └──────────────────────────────────────────────┼─────────────────┘
//!                                                ▼
//!                                           peripheral
//! ```

use exdevice_protocol::{ProtocolError, RequestKey};
use thiserror::Error;

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod logging;
pub mod reassembly;
pub mod transport;

pub use config::DispatchConfig;
pub use controller::{AdapterState, AdapterStateListener, DeviceController, DeviceSession};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use logging::init_logging;
pub use transport::{BleTransport, TransportError};

/// Errors that can occur while dispatching to a peripheral
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Session is closed")]
    Closed,
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("No reply to request {0:#06x} within timeout")]
    ReplyTimeout(RequestKey),
    #[error("Request {0:#06x} is already awaiting a reply")]
    RequestInFlight(RequestKey),
    #[error("Packet does not expect a reply")]
    NoReplyExpected,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for dispatcher operations
pub type Result<T> = core::result::Result<T, DispatchError>;
