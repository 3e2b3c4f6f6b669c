//! # Codec Contract
//!
//! Every device family plugs in as one [`ProtocolCodec`] implementation. The
//! trait is split in two halves:
//!
//! - **Required**: the wire format itself (`encode_frame`, `parse_frame`) and
//!   access to the embedded [`CodecCore`].
//! - **Provided**: lifecycle guarding, GATT accessors, throttle interval,
//!   listener and attachment handling. Implementations normally leave these
//!   alone and only override the GATT accessors when their hardware differs.
//!
//! ## Lifecycle
//!
//! ```text
//!                initialize()
//! Uninitialized ──────────────► Ready
//!       │                         │
//!       │ destroy()               │ destroy()
//!       ▼                         ▼
//!   Destroyed ◄───────────────────┘   (terminal)
//! ```
//!
//! `encode`/`decode` are valid only in `Ready`. Every operation on a
//! destroyed codec fails with [`ProtocolError::Destroyed`].
//!
//! ## Threading
//!
//! A codec is owned by exactly one dispatcher and accessed through `&mut`;
//! callers needing shared access wrap it in one lock per connection.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info};

use crate::error::{ProtocolError, Result};
use crate::gatt::GattProfile;
use crate::result::ParsedResult;
use crate::throttle::{validate_interval_ms, DEFAULT_SEND_INTERVAL_MS};

/// Stable identifier of a codec family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolType(pub u16);

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol#{}", self.0)
    }
}

/// Key matching a reply to the request that caused it
///
/// Command code or sequence number, whichever the wire format embeds.
pub type RequestKey = u16;

/// Receiver of device-initiated events
///
/// The codec only holds a weak reference; the application owns the listener.
pub trait EventListener<P>: Send + Sync {
    fn on_event(&self, packet: P);
}

/// Lookup into the dispatcher's table of outstanding requests
pub trait PendingRequests {
    fn is_pending(&self, key: RequestKey) -> bool;
}

/// No request is outstanding
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPending;

impl PendingRequests for NoPending {
    fn is_pending(&self, _key: RequestKey) -> bool {
        false
    }
}

impl PendingRequests for HashSet<RequestKey> {
    fn is_pending(&self, key: RequestKey) -> bool {
        self.contains(&key)
    }
}

impl<V> PendingRequests for HashMap<RequestKey, V> {
    fn is_pending(&self, key: RequestKey) -> bool {
        self.contains_key(&key)
    }
}

/// Reassembly hint for a buffer of received notification bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    /// More bytes are needed before a frame can be cut
    Incomplete,
    /// A frame of `n` bytes starts here, possibly not fully buffered yet
    Complete(usize),
    /// The first `n` bytes can never start a frame and should be dropped
    Skip(usize),
}

/// Lifecycle state of a codec instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    Destroyed,
}

/// State shared by every codec: identity, GATT profile, throttle interval,
/// weak listener, typed attachment and lifecycle
pub struct CodecCore<L: ?Sized, A = ()> {
    protocol_type: ProtocolType,
    gatt: GattProfile,
    send_interval: Duration,
    listener: Option<Weak<L>>,
    attachment: Option<A>,
    lifecycle: Lifecycle,
}

impl<L: ?Sized, A> CodecCore<L, A> {
    /// Core with the baseline GATT profile and default send interval
    pub fn new(protocol_type: ProtocolType) -> Self {
        Self {
            protocol_type,
            gatt: GattProfile::baseline(),
            send_interval: Duration::from_millis(DEFAULT_SEND_INTERVAL_MS),
            listener: None,
            attachment: None,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    /// Replace the GATT profile (for hardware that deviates from the baseline)
    pub fn with_gatt(mut self, gatt: GattProfile) -> Self {
        self.gatt = gatt;
        self
    }

    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    /// Register the listener at construction time
    pub fn with_listener(mut self, listener: &Arc<L>) -> Self {
        self.listener = Some(Arc::downgrade(listener));
        self
    }

    pub fn protocol_type(&self) -> ProtocolType {
        self.protocol_type
    }

    pub fn gatt(&self) -> &GattProfile {
        &self.gatt
    }

    pub fn send_interval(&self) -> Duration {
        self.send_interval
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Fail unless encode/decode are currently allowed
    pub fn ensure_ready(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Uninitialized => Err(ProtocolError::NotInitialized),
            Lifecycle::Destroyed => Err(ProtocolError::Destroyed),
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.lifecycle == Lifecycle::Destroyed {
            return Err(ProtocolError::Destroyed);
        }
        Ok(())
    }

    /// Live listener, if one is registered and still alive
    pub fn listener(&self) -> Option<Arc<L>> {
        self.listener.as_ref().and_then(Weak::upgrade)
    }

    pub fn has_listener(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    pub fn attachment(&self) -> Option<&A> {
        self.attachment.as_ref()
    }

    pub fn attachment_mut(&mut self) -> Option<&mut A> {
        self.attachment.as_mut()
    }
}

impl<L: ?Sized, A> fmt::Debug for CodecCore<L, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecCore")
            .field("protocol_type", &self.protocol_type)
            .field("gatt", &self.gatt)
            .field("send_interval", &self.send_interval)
            .field("has_listener", &self.has_listener())
            .field("has_attachment", &self.attachment.is_some())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Contract every device-family codec satisfies
///
/// # Example
///
/// ```ignore
/// struct ScaleCodec {
///     core: CodecCore<dyn EventListener<ScalePacket>>,
/// }
///
/// impl ProtocolCodec for ScaleCodec {
///     type Packet = ScalePacket;
///     type Listener = dyn EventListener<ScalePacket>;
///     type Attachment = ();
///
///     fn core(&self) -> &CodecCore<Self::Listener> { &self.core }
///     fn core_mut(&mut self) -> &mut CodecCore<Self::Listener> { &mut self.core }
///     fn encode_frame(&self, packet: &ScalePacket) -> Result<Vec<u8>> { /* ... */ }
///     fn parse_frame(&mut self, data: &[u8], pending: &dyn PendingRequests)
///         -> ParsedResult<ScalePacket, Self::Listener> { /* ... */ }
/// }
/// ```
pub trait ProtocolCodec: Send {
    /// Packet variants this wire format carries
    type Packet: Send;
    /// Capability receiving device-initiated events
    type Listener: EventListener<Self::Packet> + ?Sized;
    /// Codec-specific bookkeeping attached by the application
    type Attachment: Send;

    fn core(&self) -> &CodecCore<Self::Listener, Self::Attachment>;

    fn core_mut(&mut self) -> &mut CodecCore<Self::Listener, Self::Attachment>;

    /// Serialize one packet into the exact bytes for the send characteristic
    fn encode_frame(&self, packet: &Self::Packet) -> Result<Vec<u8>>;

    /// Classify one complete inbound frame. Must not panic on any input.
    fn parse_frame(
        &mut self,
        data: &[u8],
        pending: &dyn PendingRequests,
    ) -> ParsedResult<Self::Packet, Self::Listener>;

    /// Codec-specific setup, run once by `initialize`
    fn on_initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Codec-specific teardown, run once by `destroy`
    fn on_destroy(&mut self) {}

    /// Key under which the reply to `packet` will arrive, if it expects one
    fn request_key(&self, _packet: &Self::Packet) -> Option<RequestKey> {
        None
    }

    /// Key of the outstanding request a decoded reply answers
    fn reply_key(&self, reply: &Self::Packet) -> Option<RequestKey> {
        self.request_key(reply)
    }

    /// How many buffered bytes make up the next frame
    ///
    /// The default treats each notification as one complete frame.
    fn frame_length(&self, buffered: &[u8]) -> FrameLength {
        if buffered.is_empty() {
            FrameLength::Incomplete
        } else {
            FrameLength::Complete(buffered.len())
        }
    }

    fn protocol_type(&self) -> ProtocolType {
        self.core().protocol_type()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.core().lifecycle()
    }

    /// Move from `Uninitialized` to `Ready`; a no-op when already ready
    fn initialize(&mut self) -> Result<()> {
        match self.core().lifecycle() {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Destroyed => Err(ProtocolError::Destroyed),
            Lifecycle::Uninitialized => {
                self.on_initialize()?;
                self.core_mut().lifecycle = Lifecycle::Ready;
                info!("{} initialized", self.protocol_type());
                Ok(())
            }
        }
    }

    /// Release listener and attachment and enter the terminal state.
    /// Safe to call more than once.
    fn destroy(&mut self) {
        if self.core().lifecycle() == Lifecycle::Destroyed {
            return;
        }
        self.on_destroy();
        let core = self.core_mut();
        core.listener = None;
        core.attachment = None;
        core.lifecycle = Lifecycle::Destroyed;
        info!("{} destroyed", self.protocol_type());
    }

    fn is_destroyed(&self) -> bool {
        self.core().lifecycle() == Lifecycle::Destroyed
    }

    fn encode(&self, packet: &Self::Packet) -> Result<Vec<u8>> {
        self.core().ensure_ready()?;
        self.encode_frame(packet)
    }

    /// Decode one frame; errors only on lifecycle misuse, never on bad bytes
    fn decode(
        &mut self,
        data: &[u8],
        pending: &dyn PendingRequests,
    ) -> Result<ParsedResult<Self::Packet, Self::Listener>> {
        self.core().ensure_ready()?;
        let result = self.parse_frame(data, pending);
        debug!(
            "{} decoded {} bytes as {:?}",
            self.protocol_type(),
            data.len(),
            result.kind()
        );
        Ok(result)
    }

    fn gatt_profile(&self) -> GattProfile {
        GattProfile {
            service: self.service_uuid(),
            send: self.send_uuid(),
            recv: self.recv_uuid(),
            descriptor: self.descriptor_uuid(),
        }
    }

    fn service_uuid(&self) -> uuid::Uuid {
        self.core().gatt().service
    }

    fn send_uuid(&self) -> uuid::Uuid {
        self.core().gatt().send
    }

    fn recv_uuid(&self) -> uuid::Uuid {
        self.core().gatt().recv
    }

    fn descriptor_uuid(&self) -> uuid::Uuid {
        self.core().gatt().descriptor
    }

    /// Suggested minimum spacing between writes, in milliseconds.
    /// Negative values are rejected; zero disables throttling.
    fn set_max_send_interval(&mut self, ms: i64) -> Result<()> {
        self.core().ensure_alive()?;
        let interval = validate_interval_ms(ms)?;
        self.core_mut().send_interval = interval;
        Ok(())
    }

    fn max_send_interval(&self) -> u64 {
        u64::try_from(self.core().send_interval().as_millis()).unwrap_or(u64::MAX)
    }

    fn send_interval(&self) -> Duration {
        self.core().send_interval()
    }

    fn has_event_listener(&self) -> bool {
        self.core().has_listener()
    }

    fn event_listener(&self) -> Option<Arc<Self::Listener>> {
        self.core().listener()
    }

    fn set_event_listener(&mut self, listener: &Arc<Self::Listener>) -> Result<()> {
        self.core().ensure_alive()?;
        self.core_mut().listener = Some(Arc::downgrade(listener));
        Ok(())
    }

    fn clear_event_listener(&mut self) {
        self.core_mut().listener = None;
    }

    fn attachment(&self) -> Option<&Self::Attachment> {
        self.core().attachment()
    }

    fn attachment_mut(&mut self) -> Option<&mut Self::Attachment> {
        self.core_mut().attachment_mut()
    }

    fn set_attachment(&mut self, attachment: Self::Attachment) -> Result<()> {
        self.core().ensure_alive()?;
        self.core_mut().attachment = Some(attachment);
        Ok(())
    }

    fn take_attachment(&mut self) -> Option<Self::Attachment> {
        self.core_mut().attachment.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ResultKind;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<u8>>);

    impl EventListener<u8> for Recorder {
        fn on_event(&self, packet: u8) {
            self.0.lock().unwrap().push(packet);
        }
    }

    /// One-byte frames: even bytes are push events, odd bytes reply to key 1
    struct EchoCodec {
        core: CodecCore<dyn EventListener<u8>, String>,
        setups: u32,
        teardowns: u32,
    }

    impl EchoCodec {
        fn new() -> Self {
            Self {
                core: CodecCore::new(ProtocolType(9)),
                setups: 0,
                teardowns: 0,
            }
        }
    }

    impl ProtocolCodec for EchoCodec {
        type Packet = u8;
        type Listener = dyn EventListener<u8>;
        type Attachment = String;

        fn core(&self) -> &CodecCore<Self::Listener, String> {
            &self.core
        }

        fn core_mut(&mut self) -> &mut CodecCore<Self::Listener, String> {
            &mut self.core
        }

        fn encode_frame(&self, packet: &u8) -> Result<Vec<u8>> {
            Ok(vec![*packet])
        }

        fn parse_frame(
            &mut self,
            data: &[u8],
            pending: &dyn PendingRequests,
        ) -> ParsedResult<u8, Self::Listener> {
            match data {
                [b] if b % 2 == 0 => ParsedResult::active_event(*b, self.event_listener()),
                [b] if pending.is_pending(1) => ParsedResult::reply(*b),
                _ => ParsedResult::unrecognized(),
            }
        }

        fn on_initialize(&mut self) -> Result<()> {
            self.setups += 1;
            Ok(())
        }

        fn on_destroy(&mut self) {
            self.teardowns += 1;
        }
    }

    #[test]
    fn test_use_before_initialize() {
        let mut codec = EchoCodec::new();
        assert_eq!(codec.encode(&1), Err(ProtocolError::NotInitialized));
        assert!(matches!(
            codec.decode(&[1], &NoPending),
            Err(ProtocolError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_runs_hook_once() {
        let mut codec = EchoCodec::new();
        codec.initialize().unwrap();
        codec.initialize().unwrap();
        assert_eq!(codec.setups, 1);
        assert_eq!(codec.lifecycle(), Lifecycle::Ready);
    }

    #[test]
    fn test_destroy_is_terminal_and_idempotent() {
        let mut codec = EchoCodec::new();
        codec.initialize().unwrap();
        codec.set_attachment("session-key".into()).unwrap();
        codec.destroy();
        codec.destroy();

        assert_eq!(codec.teardowns, 1);
        assert!(codec.is_destroyed());
        assert!(codec.attachment().is_none());
        assert_eq!(codec.encode(&2), Err(ProtocolError::Destroyed));
        assert!(matches!(
            codec.decode(&[2], &NoPending),
            Err(ProtocolError::Destroyed)
        ));
        assert_eq!(codec.initialize(), Err(ProtocolError::Destroyed));
        assert_eq!(codec.set_max_send_interval(10), Err(ProtocolError::Destroyed));
    }

    #[test]
    fn test_destroy_releases_listener() {
        let listener: Arc<dyn EventListener<u8>> = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut codec = EchoCodec::new();
        codec.set_event_listener(&listener).unwrap();
        assert!(codec.has_event_listener());

        codec.destroy();
        assert!(!codec.has_event_listener());
        assert_eq!(Arc::strong_count(&listener), 1);
    }

    #[test]
    fn test_listener_is_weak() {
        let mut codec = EchoCodec::new();
        codec.initialize().unwrap();
        {
            let listener: Arc<dyn EventListener<u8>> =
                Arc::new(Recorder(Mutex::new(Vec::new())));
            codec.set_event_listener(&listener).unwrap();
            assert!(codec.has_event_listener());
        }
        assert!(!codec.has_event_listener());

        let result = codec.decode(&[4], &NoPending).unwrap();
        assert_eq!(result.kind(), ResultKind::ActiveEvent);
        assert!(result.event_callback().is_none());
    }

    #[test]
    fn test_event_carries_listener() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let listener: Arc<dyn EventListener<u8>> = recorder.clone();
        let mut codec = EchoCodec::new();
        codec.initialize().unwrap();
        codec.set_event_listener(&listener).unwrap();

        let (kind, packet, callback) = codec.decode(&[6], &NoPending).unwrap().into_parts();
        assert_eq!(kind, ResultKind::ActiveEvent);
        callback.unwrap().on_event(packet.unwrap());
        assert_eq!(*recorder.0.lock().unwrap(), vec![6]);
    }

    #[test]
    fn test_reply_needs_pending_request() {
        let mut codec = EchoCodec::new();
        codec.initialize().unwrap();

        let unsolicited = codec.decode(&[3], &NoPending).unwrap();
        assert_eq!(unsolicited.kind(), ResultKind::Unrecognized);

        let pending: HashSet<RequestKey> = [1].into_iter().collect();
        let reply = codec.decode(&[3], &pending).unwrap();
        assert_eq!(reply.kind(), ResultKind::Reply);
        assert!(reply.event_callback().is_none());
    }

    #[test]
    fn test_send_interval() {
        let mut codec = EchoCodec::new();
        assert_eq!(codec.max_send_interval(), 500);

        codec.set_max_send_interval(0).unwrap();
        assert_eq!(codec.send_interval(), Duration::ZERO);

        let err = codec.set_max_send_interval(-1).unwrap_err();
        assert!(matches!(err, ProtocolError::Configuration(_)));
        assert_eq!(codec.max_send_interval(), 0);
    }

    #[test]
    fn test_default_gatt() {
        let codec = EchoCodec::new();
        assert_eq!(
            codec.service_uuid().to_string(),
            "0000fff0-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(codec.gatt_profile(), GattProfile::baseline());
    }

    #[test]
    fn test_attachment_roundtrip() {
        let mut codec = EchoCodec::new();
        codec.set_attachment("a".into()).unwrap();
        codec.attachment_mut().unwrap().push('b');
        assert_eq!(codec.attachment().map(String::as_str), Some("ab"));
        assert_eq!(codec.take_attachment().as_deref(), Some("ab"));
        assert!(codec.attachment().is_none());
    }
}
