//! # Checksummed Frame Codec
//!
//! A generic reference wire format that exercises the whole codec contract.
//! Device families with their own layout implement [`ProtocolCodec`]
//! directly; this codec suits peripherals speaking the simple envelope below.
//!
//! ## Frame Format
//!
//! ```text
//! ┌────────┬─────────┬────────┬──────────────────┬──────────┐
//! │ Header │ Command │ Length │     Payload      │ Checksum │
//! │  0xAA  │ 1 byte  │ 1 byte │  Length bytes    │  1 byte  │
//! └────────┴─────────┴────────┴──────────────────┴──────────┘
//! ```
//!
//! The checksum is the wrapping sum of command, length and payload bytes.
//! Replies reuse the command code of the request, which doubles as the
//! request key.

use std::collections::HashSet;

use heapless::Vec as BoundedVec;
use log::trace;

use crate::codec::{
    CodecCore, EventListener, FrameLength, PendingRequests, ProtocolCodec, ProtocolType,
    RequestKey,
};
use crate::error::{ProtocolError, Result};
use crate::result::ParsedResult;

/// First byte of every frame
pub const FRAME_HEADER: u8 = 0xAA;

/// Header, command, length and checksum
pub const FRAME_OVERHEAD: usize = 4;

/// Shortest possible frame (empty payload)
pub const MIN_FRAME_LEN: usize = FRAME_OVERHEAD;

/// Largest payload the one-byte length field can describe
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Writable length of a characteristic at the default ATT MTU (23 - 3)
pub const DEFAULT_MAX_FRAME_LEN: usize = 20;

/// One command or response carried in a checksummed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePacket {
    pub command: u8,
    pub payload: BoundedVec<u8, MAX_PAYLOAD_LEN>,
}

impl FramePacket {
    pub fn new(command: u8, payload: &[u8]) -> Result<Self> {
        let mut bounded = BoundedVec::new();
        bounded.extend_from_slice(payload).map_err(|_| {
            ProtocolError::Encoding(format!(
                "payload of {} bytes exceeds {MAX_PAYLOAD_LEN}",
                payload.len()
            ))
        })?;
        Ok(Self {
            command,
            payload: bounded,
        })
    }

    /// Size of this packet once framed
    pub fn frame_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

/// Listener capability for frame-codec events
pub type FrameListener = dyn EventListener<FramePacket>;

/// Wrapping byte sum over command, length and payload
pub fn checksum(command: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(command.wrapping_add(payload.len() as u8), |acc, b| {
            acc.wrapping_add(*b)
        })
}

/// Reference codec for the checksummed envelope
pub struct ChecksumFrameCodec {
    core: CodecCore<FrameListener>,
    push_codes: HashSet<u8>,
    max_frame_len: usize,
}

impl ChecksumFrameCodec {
    pub fn new(protocol_type: ProtocolType) -> Self {
        Self::with_core(CodecCore::new(protocol_type))
    }

    /// Build around a pre-configured core (e.g. from [`crate::ProtocolConfig`])
    pub fn with_core(core: CodecCore<FrameListener>) -> Self {
        Self {
            core,
            push_codes: HashSet::new(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Commands the peripheral sends unsolicited
    pub fn with_push_codes(mut self, codes: impl IntoIterator<Item = u8>) -> Self {
        self.push_codes.extend(codes);
        self
    }

    /// Writable length of the send characteristic, e.g. after MTU negotiation
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len.max(MIN_FRAME_LEN);
        self
    }

    pub fn is_push_code(&self, command: u8) -> bool {
        self.push_codes.contains(&command)
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl ProtocolCodec for ChecksumFrameCodec {
    type Packet = FramePacket;
    type Listener = FrameListener;
    type Attachment = ();

    fn core(&self) -> &CodecCore<FrameListener> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CodecCore<FrameListener> {
        &mut self.core
    }

    fn encode_frame(&self, packet: &FramePacket) -> Result<Vec<u8>> {
        if self.is_push_code(packet.command) {
            return Err(ProtocolError::Encoding(format!(
                "command {:#04x} is device-initiated only",
                packet.command
            )));
        }
        if packet.frame_len() > self.max_frame_len {
            return Err(ProtocolError::Encoding(format!(
                "frame of {} bytes exceeds writable length {}",
                packet.frame_len(),
                self.max_frame_len
            )));
        }

        let mut frame = Vec::with_capacity(packet.frame_len());
        frame.push(FRAME_HEADER);
        frame.push(packet.command);
        frame.push(packet.payload.len() as u8);
        frame.extend_from_slice(&packet.payload);
        frame.push(checksum(packet.command, &packet.payload));
        Ok(frame)
    }

    fn parse_frame(
        &mut self,
        data: &[u8],
        pending: &dyn PendingRequests,
    ) -> ParsedResult<FramePacket, FrameListener> {
        // Header check
        if data.len() < MIN_FRAME_LEN || data[0] != FRAME_HEADER {
            return ParsedResult::unrecognized();
        }

        // Length and checksum check
        let command = data[1];
        let payload_len = data[2] as usize;
        if data.len() != FRAME_OVERHEAD + payload_len {
            trace!(
                "length mismatch: declared {} payload bytes in {} byte frame",
                payload_len,
                data.len()
            );
            return ParsedResult::malformed();
        }
        let payload = &data[3..3 + payload_len];
        let expected = checksum(command, payload);
        let actual = data[data.len() - 1];
        if expected != actual {
            trace!("checksum mismatch: expected {expected:#04x}, got {actual:#04x}");
            return ParsedResult::malformed();
        }

        let packet = match FramePacket::new(command, payload) {
            Ok(packet) => packet,
            Err(_) => return ParsedResult::malformed(),
        };

        // Route
        if pending.is_pending(RequestKey::from(command)) {
            ParsedResult::reply(packet)
        } else if self.is_push_code(command) {
            ParsedResult::active_event(packet, self.core.listener())
        } else {
            ParsedResult::unrecognized()
        }
    }

    fn request_key(&self, packet: &FramePacket) -> Option<RequestKey> {
        Some(RequestKey::from(packet.command))
    }

    fn frame_length(&self, buffered: &[u8]) -> FrameLength {
        match buffered.iter().position(|b| *b == FRAME_HEADER) {
            None if buffered.is_empty() => FrameLength::Incomplete,
            None => FrameLength::Skip(buffered.len()),
            Some(0) if buffered.len() < 3 => FrameLength::Incomplete,
            Some(0) => FrameLength::Complete(FRAME_OVERHEAD + buffered[2] as usize),
            Some(offset) => FrameLength::Skip(offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NoPending;
    use crate::result::ResultKind;
    use std::sync::{Arc, Mutex};

    const READ_RECORD: u8 = 0x01;
    const MEASUREMENT_PUSH: u8 = 0x40;

    struct Collector(Mutex<Vec<FramePacket>>);

    impl EventListener<FramePacket> for Collector {
        fn on_event(&self, packet: FramePacket) {
            self.0.lock().unwrap().push(packet);
        }
    }

    fn ready_codec() -> ChecksumFrameCodec {
        let mut codec =
            ChecksumFrameCodec::new(ProtocolType(1)).with_push_codes([MEASUREMENT_PUSH]);
        codec.initialize().unwrap();
        codec
    }

    fn pending(keys: &[RequestKey]) -> HashSet<RequestKey> {
        keys.iter().copied().collect()
    }

    #[test]
    fn test_encode_layout() {
        let codec = ready_codec();
        let packet = FramePacket::new(READ_RECORD, &[0x10, 0x20]).unwrap();
        let frame = codec.encode(&packet).unwrap();
        assert_eq!(frame, vec![0xAA, 0x01, 0x02, 0x10, 0x20, 0x33]);
    }

    #[test]
    fn test_reply_roundtrip() {
        let mut codec = ready_codec();
        let packet = FramePacket::new(READ_RECORD, &[1, 2, 3, 4]).unwrap();
        let frame = codec.encode(&packet).unwrap();

        let result = codec.decode(&frame, &pending(&[1])).unwrap();
        assert_eq!(result.kind(), ResultKind::Reply);
        assert_eq!(result.into_reply().unwrap(), packet);
    }

    #[test]
    fn test_short_input_unrecognized() {
        let mut codec = ready_codec();
        for data in [&[][..], &[0xAA], &[0xAA, 0x01], &[0xAA, 0x01, 0x00]] {
            let result = codec.decode(data, &pending(&[1])).unwrap();
            assert_eq!(result.kind(), ResultKind::Unrecognized);
        }
    }

    #[test]
    fn test_wrong_header_unrecognized() {
        let mut codec = ready_codec();
        let result = codec.decode(&[0x55, 0x01, 0x00, 0x01], &NoPending).unwrap();
        assert_eq!(result.kind(), ResultKind::Unrecognized);
    }

    #[test]
    fn test_known_header_bad_checksum_malformed() {
        let mut codec = ready_codec();
        let result = codec.decode(&[0xAA, 0x01, 0x02, 0x7F], &NoPending).unwrap();
        assert_eq!(result.kind(), ResultKind::Malformed);
        assert!(result.packet().is_none());
    }

    #[test]
    fn test_corrupted_checksum_malformed() {
        let mut codec = ready_codec();
        let packet = FramePacket::new(READ_RECORD, &[9, 8, 7]).unwrap();
        let mut frame = codec.encode(&packet).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let result = codec.decode(&frame, &pending(&[1])).unwrap();
        assert_eq!(result.kind(), ResultKind::Malformed);
    }

    #[test]
    fn test_push_without_listener() {
        let mut codec = ready_codec();
        let frame = [0xAA, MEASUREMENT_PUSH, 0x01, 0x05, checksum(MEASUREMENT_PUSH, &[5])];
        let result = codec.decode(&frame, &NoPending).unwrap();
        assert_eq!(result.kind(), ResultKind::ActiveEvent);
        assert!(result.event_callback().is_none());
        assert_eq!(result.packet().unwrap().payload.as_slice(), &[5]);
    }

    #[test]
    fn test_push_with_listener() {
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        let listener: Arc<FrameListener> = collector.clone();
        let mut codec = ready_codec();
        codec.set_event_listener(&listener).unwrap();

        let frame = [0xAA, MEASUREMENT_PUSH, 0x00, MEASUREMENT_PUSH];
        let (kind, packet, callback) = codec.decode(&frame, &NoPending).unwrap().into_parts();
        assert_eq!(kind, ResultKind::ActiveEvent);
        callback.unwrap().on_event(packet.unwrap());
        assert_eq!(collector.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsolicited_reply_unrecognized() {
        let mut codec = ready_codec();
        let frame = [0xAA, READ_RECORD, 0x00, READ_RECORD];
        let result = codec.decode(&frame, &NoPending).unwrap();
        assert_eq!(result.kind(), ResultKind::Unrecognized);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let codec = ready_codec();
        let packet = FramePacket::new(READ_RECORD, &[0u8; 17]).unwrap();
        assert!(matches!(codec.encode(&packet), Err(ProtocolError::Encoding(_))));

        let mut wide = ChecksumFrameCodec::new(ProtocolType(1)).with_max_frame_len(244);
        wide.initialize().unwrap();
        assert_eq!(wide.encode(&packet).unwrap().len(), 21);
    }

    #[test]
    fn test_push_code_not_encodable() {
        let codec = ready_codec();
        let packet = FramePacket::new(MEASUREMENT_PUSH, &[]).unwrap();
        assert!(matches!(codec.encode(&packet), Err(ProtocolError::Encoding(_))));
    }

    #[test]
    fn test_payload_limit() {
        assert!(FramePacket::new(0x02, &[0u8; MAX_PAYLOAD_LEN]).is_ok());
        assert!(FramePacket::new(0x02, &[0u8; MAX_PAYLOAD_LEN + 1]).is_err());
    }

    #[test]
    fn test_frame_length_hint() {
        let codec = ready_codec();
        assert_eq!(codec.frame_length(&[]), FrameLength::Incomplete);
        assert_eq!(codec.frame_length(&[0xAA, 0x01]), FrameLength::Incomplete);
        assert_eq!(
            codec.frame_length(&[0xAA, 0x01, 0x02, 0x00]),
            FrameLength::Complete(6)
        );
        assert_eq!(
            codec.frame_length(&[0xAA, 0x01, 0x00, 0x01, 0xAA]),
            FrameLength::Complete(4)
        );
        assert_eq!(codec.frame_length(&[0x00, 0x13, 0xAA]), FrameLength::Skip(2));
        assert_eq!(codec.frame_length(&[0x00, 0x13]), FrameLength::Skip(2));
    }

    #[test]
    fn test_request_key_is_command() {
        let codec = ready_codec();
        let packet = FramePacket::new(0x22, &[]).unwrap();
        assert_eq!(codec.request_key(&packet), Some(0x22));
    }
}
