//! # Receive Reassembly
//!
//! BLE notifications are capped by the negotiated MTU, so one protocol frame
//! may arrive split over several notifications, and one notification may
//! carry the tail of one frame and the head of the next. Received bytes
//! accumulate here until the codec's [`FrameLength`] hint says a complete
//! frame is available.
//!
//! ```text
//! notify #1: AA 01 05 10 20 │
//! notify #2: 30 40 50 F6 AA │ 40 00 ...
//!            └────── frame ──────┘
//! ```

use exdevice_protocol::FrameLength;

/// Buffer exceeded its limit; buffered bytes were discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// Bounded accumulator for inbound notification bytes
#[derive(Debug)]
pub struct ReceiveBuffer {
    data: Vec<u8>,
    limit: usize,
}

impl ReceiveBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    /// Number of buffered bytes not yet cut into frames
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a notification
    ///
    /// On overflow the stale bytes are dropped; the new chunk is kept when it
    /// fits on its own, since it may start a fresh frame.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), Overflow> {
        if self.data.len() + chunk.len() <= self.limit {
            self.data.extend_from_slice(chunk);
            return Ok(());
        }
        self.data.clear();
        if chunk.len() <= self.limit {
            self.data.extend_from_slice(chunk);
        }
        Err(Overflow)
    }

    /// Cut the next complete frame, discarding bytes the hint marks as junk
    pub fn next_frame(&mut self, hint: impl Fn(&[u8]) -> FrameLength) -> Option<Vec<u8>> {
        loop {
            match hint(&self.data) {
                FrameLength::Incomplete => return None,
                // A frame that can never fit is a false header
                FrameLength::Complete(n) if n > self.limit => {
                    if self.data.is_empty() {
                        return None;
                    }
                    self.data.remove(0);
                }
                FrameLength::Complete(n) if n > self.data.len() => return None,
                FrameLength::Complete(0) | FrameLength::Skip(0) => {
                    if self.data.is_empty() {
                        return None;
                    }
                    self.data.remove(0);
                }
                FrameLength::Complete(n) => return Some(self.data.drain(..n).collect()),
                FrameLength::Skip(n) => {
                    if self.data.is_empty() {
                        return None;
                    }
                    self.data.drain(..n.min(self.data.len()));
                }
            }
        }
    }

    /// Cut every complete frame currently buffered
    pub fn drain_frames(&mut self, hint: impl Fn(&[u8]) -> FrameLength) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame(&hint) {
            frames.push(frame);
        }
        frames
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}
