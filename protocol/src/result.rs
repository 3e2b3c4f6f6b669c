//! # Parsed Results
//!
//! One decoded inbound frame. The dispatcher consumes it exactly once and
//! routes it by [`ResultKind`]:
//!
//! ```text
//! Reply         ──► caller awaiting the request
//! ActiveEvent   ──► registered event listener (dropped when none)
//! Unrecognized  ──► logged and counted
//! Malformed     ──► logged and counted
//! ```

use std::sync::Arc;

use crate::error::{ProtocolError, Result};

/// Classification of one decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// Response to a host-initiated request
    Reply,
    /// Unsolicited push from the peripheral
    ActiveEvent,
    /// Bytes did not match any known frame
    Unrecognized,
    /// Frame matched a known header but failed length or checksum validation
    Malformed,
}

/// Outcome of decoding one inbound frame
///
/// Only the constructors below exist, so an event callback can never be
/// attached to anything but an `ActiveEvent`.
pub struct ParsedResult<P, L: ?Sized> {
    kind: ResultKind,
    packet: Option<P>,
    event_callback: Option<Arc<L>>,
}

impl<P, L: ?Sized> ParsedResult<P, L> {
    /// A reply to an outstanding request
    pub fn reply(packet: P) -> Self {
        Self {
            kind: ResultKind::Reply,
            packet: Some(packet),
            event_callback: None,
        }
    }

    /// A device-initiated event, carrying the listener configured at decode
    /// time (absent when none is registered)
    pub fn active_event(packet: P, listener: Option<Arc<L>>) -> Self {
        Self {
            kind: ResultKind::ActiveEvent,
            packet: Some(packet),
            event_callback: listener,
        }
    }

    pub fn unrecognized() -> Self {
        Self {
            kind: ResultKind::Unrecognized,
            packet: None,
            event_callback: None,
        }
    }

    pub fn malformed() -> Self {
        Self {
            kind: ResultKind::Malformed,
            packet: None,
            event_callback: None,
        }
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn packet(&self) -> Option<&P> {
        self.packet.as_ref()
    }

    pub fn event_callback(&self) -> Option<&Arc<L>> {
        self.event_callback.as_ref()
    }

    /// Split into owned parts for routing
    pub fn into_parts(self) -> (ResultKind, Option<P>, Option<Arc<L>>) {
        (self.kind, self.packet, self.event_callback)
    }

    /// Extract the packet of a reply, mapping every other kind to an error
    pub fn into_reply(self) -> Result<P> {
        match (self.kind, self.packet) {
            (ResultKind::Reply, Some(packet)) => Ok(packet),
            (ResultKind::Malformed, _) => Err(ProtocolError::DecodingMalformed),
            _ => Err(ProtocolError::DecodingUnrecognized),
        }
    }
}

impl<P: core::fmt::Debug, L: ?Sized> core::fmt::Debug for ParsedResult<P, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParsedResult")
            .field("kind", &self.kind)
            .field("packet", &self.packet)
            .field("has_callback", &self.event_callback.is_some())
            .finish()
    }
}
