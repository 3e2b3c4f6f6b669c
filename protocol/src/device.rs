//! Catalogue of supported external devices, keyed by advertised BLE name.

use serde::{Deserialize, Serialize};

/// Known external measurement devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceModel {
    /// Blood glucose meter
    BloodGlucoseVgm55,
    /// Blood pressure monitor
    BloodPressureAoj30b,
}

impl DeviceModel {
    pub const ALL: [DeviceModel; 2] = [Self::BloodGlucoseVgm55, Self::BloodPressureAoj30b];

    /// Name the device advertises over BLE
    pub const fn ble_name(&self) -> &'static str {
        match self {
            Self::BloodGlucoseVgm55 => "SKG_VGM55",
            Self::BloodPressureAoj30b => "SKG_AOJ-30B",
        }
    }

    /// Vendor model label
    pub const fn model_label(&self) -> &'static str {
        match self {
            Self::BloodGlucoseVgm55 => "3805",
            Self::BloodPressureAoj30b => "8703",
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::BloodGlucoseVgm55 => "blood glucose meter",
            Self::BloodPressureAoj30b => "blood pressure monitor",
        }
    }

    pub fn from_ble_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|model| model.ble_name() == name)
    }
}

/// Whether `ble_name` belongs to a supported external device
pub fn is_ex_device(ble_name: &str) -> bool {
    DeviceModel::from_ble_name(ble_name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(
            DeviceModel::from_ble_name("SKG_AOJ-30B"),
            Some(DeviceModel::BloodPressureAoj30b)
        );
        assert!(is_ex_device("SKG_VGM55"));
        assert!(!is_ex_device("skg_vgm55"));
        assert!(!is_ex_device("Mi Band"));
    }
}
