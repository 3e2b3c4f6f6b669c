//! # GATT Identifiers
//!
//! Every codec talks to its peripheral through one service with a write
//! characteristic, a notify characteristic and the client characteristic
//! configuration descriptor used to enable notifications.
//!
//! ```text
//! Service 0000fff0-...
//!   ├── Send tunnel  0000fff6-...  (host writes frames here)
//!   └── Recv tunnel  0000fff7-...  (peripheral notifies here)
//!         └── CCC descriptor 00002902-...
//! ```
//!
//! The defaults are the common baseline for the supported hardware; a codec
//! for different hardware overrides any of the four.

use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Default service UUID
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb);

/// Default characteristic the host writes frames to
pub const DEFAULT_SEND_UUID: Uuid = Uuid::from_u128(0x0000fff6_0000_1000_8000_00805f9b34fb);

/// Default characteristic the peripheral notifies on
pub const DEFAULT_RECV_UUID: Uuid = Uuid::from_u128(0x0000fff7_0000_1000_8000_00805f9b34fb);

/// Client characteristic configuration descriptor
pub const DEFAULT_DESCRIPTOR_UUID: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// The four GATT identifiers a codec communicates through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattProfile {
    /// Primary service
    pub service: Uuid,
    /// Write characteristic (host → peripheral)
    pub send: Uuid,
    /// Notify characteristic (peripheral → host)
    pub recv: Uuid,
    /// Descriptor written to enable notifications
    pub descriptor: Uuid,
}

impl GattProfile {
    /// The baseline identifiers shared by most supported devices
    pub const fn baseline() -> Self {
        Self {
            service: DEFAULT_SERVICE_UUID,
            send: DEFAULT_SEND_UUID,
            recv: DEFAULT_RECV_UUID,
            descriptor: DEFAULT_DESCRIPTOR_UUID,
        }
    }

    /// Build a profile from UUID strings
    ///
    /// Fails with [`ProtocolError::Configuration`] naming the first field
    /// that is not a valid 128-bit UUID.
    pub fn parse(service: &str, send: &str, recv: &str, descriptor: &str) -> Result<Self> {
        Ok(Self {
            service: parse_uuid("service", service)?,
            send: parse_uuid("send", send)?,
            recv: parse_uuid("recv", recv)?,
            descriptor: parse_uuid("descriptor", descriptor)?,
        })
    }
}

impl Default for GattProfile {
    fn default() -> Self {
        Self::baseline()
    }
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| ProtocolError::Configuration(format!("{field} uuid {value:?}: {e}")))
}
