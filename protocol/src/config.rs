//! Per-codec configuration loaded from application settings.

use serde::{Deserialize, Serialize};

use crate::codec::{CodecCore, ProtocolType};
use crate::error::Result;
use crate::gatt::GattProfile;
use crate::throttle::{validate_interval_ms, DEFAULT_SEND_INTERVAL_MS};

/// Serializable form of a codec's GATT identifiers and send interval
///
/// Missing fields fall back to the baseline profile and the default interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub service_uuid: String,
    pub send_uuid: String,
    pub recv_uuid: String,
    pub descriptor_uuid: String,
    /// Negative values are rejected by [`ProtocolConfig::into_core`]
    pub max_send_interval_ms: i64,
}

impl ProtocolConfig {
    /// Validate UUIDs and interval
    pub fn gatt_profile(&self) -> Result<GattProfile> {
        GattProfile::parse(
            &self.service_uuid,
            &self.send_uuid,
            &self.recv_uuid,
            &self.descriptor_uuid,
        )
    }

    /// Build a codec core from this configuration
    pub fn into_core<L: ?Sized, A>(self, protocol_type: ProtocolType) -> Result<CodecCore<L, A>> {
        let gatt = self.gatt_profile()?;
        let interval = validate_interval_ms(self.max_send_interval_ms)?;
        Ok(CodecCore::new(protocol_type)
            .with_gatt(gatt)
            .with_send_interval(interval))
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let gatt = GattProfile::baseline();
        Self {
            service_uuid: gatt.service.to_string(),
            send_uuid: gatt.send.to_string(),
            recv_uuid: gatt.recv.to_string(),
            descriptor_uuid: gatt.descriptor.to_string(),
            max_send_interval_ms: DEFAULT_SEND_INTERVAL_MS as i64,
        }
    }
}
