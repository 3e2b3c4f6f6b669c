//! Dispatcher settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DispatchError;

/// Configuration for one dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long `request` waits for the matching reply, in milliseconds
    pub reply_timeout_ms: u64,
    /// Upper bound on buffered, not yet framed notification bytes
    pub max_receive_buffer: usize,
}

impl DispatchConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Parse from a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, DispatchError> {
        serde_json::from_str(json).map_err(|e| DispatchError::Config(e.to_string()))
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 3000,
            max_receive_buffer: 1024,
        }
    }
}
