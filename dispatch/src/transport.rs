//! # Transport Seam
//!
//! The dispatcher never talks to a BLE stack directly. The platform layer
//! (Android GATT callbacks, btleplug, a test double) implements
//! [`BleTransport`] for writes and feeds notifications back through
//! [`crate::Dispatcher::handle_notification`].
//!
//! ```text
//! ┌────────────┐  write(service, send_uuid, frame)  ┌──────────────┐
//! │ Dispatcher │ ──────────────────────────────────►│ BleTransport │──► peripheral
//! │            │ ◄──────────────────────────────────│  (platform)  │◄── notify
//! └────────────┘     handle_notification(bytes)     └──────────────┘
//! ```

use core::future::Future;

use thiserror::Error;
use uuid::Uuid;

/// Errors reported by the platform transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Peripheral is disconnected")]
    Disconnected,
    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// Write side of a connected peripheral
pub trait BleTransport: Send + Sync {
    /// Write one frame to `characteristic` of `service`
    ///
    /// Completes once the platform accepted the write; pacing is the
    /// dispatcher's job, not the transport's.
    fn write(
        &self,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Check if the peripheral link is up
    fn is_connected(&self) -> bool;
}
