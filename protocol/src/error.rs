//! Error taxonomy shared by every codec.

use thiserror::Error;

/// Errors raised by codec operations and configuration setters
///
/// Decoding bad bytes never produces an error: `decode` classifies the frame
/// instead. The two `Decoding*` variants exist for callers that turn a
/// non-reply result into an error via [`crate::ParsedResult::into_reply`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Packet cannot be encoded: {0}")]
    Encoding(String),
    #[error("Frame failed length or checksum validation")]
    DecodingMalformed,
    #[error("Frame does not match any known command")]
    DecodingUnrecognized,
    #[error("Codec has been destroyed")]
    Destroyed,
    #[error("Codec used before initialize()")]
    NotInitialized,
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Result type alias for codec operations
pub type Result<T> = core::result::Result<T, ProtocolError>;
