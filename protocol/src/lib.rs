//! # ExDevice Protocol Library
//!
//! This crate provides the core abstractions for talking to external BLE
//! measurement devices:
//!
//! - **Codec Contract**: [`ProtocolCodec`], implemented once per device family
//! - **Parsed Results**: [`ParsedResult`] classifying every inbound frame
//! - **GATT Profile**: service/characteristic/descriptor identifiers
//! - **Send Throttle**: minimum spacing between writes a device tolerates
//!
//! ## Architecture
//!
//! ```text
//! Packet ──► ProtocolCodec::encode ──► bytes ──► transport ──► peripheral
//!                                                                  │
//! Dispatcher ◄── ParsedResult ◄── ProtocolCodec::decode ◄── bytes ◄┘
//!     │
//!     ├── Reply       ──► waiting caller
//!     └── ActiveEvent ──► event listener
//! ```
//!
//! The transport and the dispatcher live outside this crate; codecs never
//! block, sleep or touch I/O.

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod gatt;
pub mod result;
pub mod throttle;

// Re-export main types for convenience
pub use codec::{
    CodecCore, EventListener, FrameLength, Lifecycle, NoPending, PendingRequests, ProtocolCodec,
    ProtocolType, RequestKey,
};
pub use config::ProtocolConfig;
pub use device::{is_ex_device, DeviceModel};
pub use error::{ProtocolError, Result};
pub use frame::{ChecksumFrameCodec, FrameListener, FramePacket};
pub use gatt::GattProfile;
pub use result::{ParsedResult, ResultKind};
pub use throttle::{SendThrottle, DEFAULT_SEND_INTERVAL_MS};

/// Library version for protocol compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
