//! # Dispatcher
//!
//! One dispatcher per connected peripheral. It owns the codec and the
//! transport handle and is the only place where results are routed:
//!
//! ```text
//!             send / request
//! caller ───────────────────► encode ──► throttle ──► transport.write
//!    ▲
//!    │ oneshot (Reply)
//!    │
//! route ◄── decode ◄── reassembly ◄── handle_notification ◄── transport
//!    │
//!    └──► listener.on_event (ActiveEvent), dropped when none is set
//! ```
//!
//! Locks are always taken in the order receive buffer → codec → pending
//! table, and none of them is held across an await point except the send
//! gate, which serializes writes so the throttle spacing holds for
//! concurrent callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use exdevice_protocol::{
    EventListener, GattProfile, ParsedResult, ProtocolCodec, ProtocolType, RequestKey,
    ResultKind, SendThrottle,
};
use log::{debug, info, trace, warn};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::DispatchConfig;
use crate::reassembly::ReceiveBuffer;
use crate::transport::BleTransport;
use crate::{DispatchError, Result};

/// Counters for one session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Frames written to the send characteristic
    pub frames_sent: u64,
    /// Bytes written to the send characteristic
    pub bytes_sent: u64,
    /// Notification bytes received
    pub bytes_received: u64,
    /// Complete frames cut from the receive buffer
    pub frames_received: u64,
    /// Replies handed to a waiting caller
    pub replies: u64,
    /// Active events handed to the listener
    pub events_delivered: u64,
    /// Active events dropped because no listener was set
    pub events_dropped: u64,
    /// Frames failing length or checksum validation
    pub malformed: u64,
    /// Frames matching no known command, or replies nobody waited for
    pub unrecognized: u64,
    /// Receive buffer overflows
    pub overflows: u64,
}

type PendingTable<P> = HashMap<RequestKey, oneshot::Sender<P>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reply receiver of one `request` call
///
/// Dropping it, whether the request finished or its future was cancelled,
/// frees the request key unless a newer request has taken it over.
struct ReplySlot<'a, P> {
    pending: &'a Mutex<PendingTable<P>>,
    key: RequestKey,
    rx: oneshot::Receiver<P>,
}

impl<P> Drop for ReplySlot<'_, P> {
    fn drop(&mut self) {
        self.rx.close();
        let mut pending = lock(self.pending);
        if pending.get(&self.key).is_some_and(|tx| tx.is_closed()) {
            pending.remove(&self.key);
        }
    }
}

/// Drives one codec over one transport
pub struct Dispatcher<C: ProtocolCodec, T: BleTransport> {
    address: String,
    codec: Mutex<C>,
    transport: T,
    config: DispatchConfig,
    pending: Mutex<PendingTable<C::Packet>>,
    receive: Mutex<ReceiveBuffer>,
    send_gate: tokio::sync::Mutex<SendThrottle>,
    stats: Mutex<DispatchStats>,
    closed: AtomicBool,
}

impl<C: ProtocolCodec, T: BleTransport> Dispatcher<C, T> {
    /// Take ownership of `codec` and initialize it for this session
    pub fn new(
        address: impl Into<String>,
        mut codec: C,
        transport: T,
        config: DispatchConfig,
    ) -> Result<Self> {
        codec.initialize()?;
        let address = address.into();
        let throttle = SendThrottle::new(codec.send_interval());
        info!(
            "{} session opened for {} (send interval {} ms)",
            codec.protocol_type(),
            address,
            codec.max_send_interval()
        );

        Ok(Self {
            address,
            receive: Mutex::new(ReceiveBuffer::new(config.max_receive_buffer)),
            codec: Mutex::new(codec),
            transport,
            config,
            pending: Mutex::new(HashMap::new()),
            send_gate: tokio::sync::Mutex::new(throttle),
            stats: Mutex::new(DispatchStats::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn protocol_type(&self) -> ProtocolType {
        lock(&self.codec).protocol_type()
    }

    pub fn gatt_profile(&self) -> GattProfile {
        lock(&self.codec).gatt_profile()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of requests currently waiting for a reply
    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn stats(&self) -> DispatchStats {
        *lock(&self.stats)
    }

    /// Session statistics as a JSON object
    pub fn stats_json(&self) -> Result<String> {
        serde_json::to_string(&self.stats())
            .map_err(|e| DispatchError::Serialization(e.to_string()))
    }

    /// Run `f` with exclusive access to the codec
    pub fn with_codec<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        let mut codec = lock(&self.codec);
        f(&mut *codec)
    }

    /// Register the listener that receives active events
    pub fn set_event_listener(&self, listener: &Arc<C::Listener>) -> Result<()> {
        self.ensure_open()?;
        lock(&self.codec).set_event_listener(listener)?;
        Ok(())
    }

    pub fn clear_event_listener(&self) {
        lock(&self.codec).clear_event_listener();
    }

    /// Change the write spacing for this session; takes effect on the next write
    pub fn set_max_send_interval(&self, ms: i64) -> Result<()> {
        self.ensure_open()?;
        lock(&self.codec).set_max_send_interval(ms)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        Ok(())
    }

    /// Encode and write a packet without waiting for a reply
    pub async fn send(&self, packet: &C::Packet) -> Result<()> {
        self.ensure_open()?;
        let frame = lock(&self.codec).encode(packet)?;
        self.write_frame(&frame, None).await
    }

    /// Write pre-built bytes, bypassing the codec but not the throttle
    pub async fn send_raw(&self, frame: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.write_frame(frame, None).await
    }

    /// Write a packet and wait for the reply matching its request key
    ///
    /// The key only counts as outstanding once the frame is about to be
    /// written, so frames arriving while the write is throttled are never
    /// taken as its reply.
    pub async fn request(&self, packet: &C::Packet) -> Result<C::Packet> {
        self.ensure_open()?;
        let (key, frame) = {
            let codec = lock(&self.codec);
            let key = codec
                .request_key(packet)
                .ok_or(DispatchError::NoReplyExpected)?;
            (key, codec.encode(packet)?)
        };
        if self.is_in_flight(key) {
            return Err(DispatchError::RequestInFlight(key));
        }

        let (tx, rx) = oneshot::channel();
        let mut slot = ReplySlot {
            pending: &self.pending,
            key,
            rx,
        };
        self.write_frame(&frame, Some((key, tx))).await?;

        match tokio::time::timeout(self.config.reply_timeout(), &mut slot.rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(DispatchError::Closed),
            Err(_) => {
                warn!("{}: no reply for request {:#06x}", self.address, key);
                Err(DispatchError::ReplyTimeout(key))
            }
        }
    }

    fn is_in_flight(&self, key: RequestKey) -> bool {
        lock(&self.pending)
            .get(&key)
            .is_some_and(|tx| !tx.is_closed())
    }

    fn register_request(&self, key: RequestKey, tx: oneshot::Sender<C::Packet>) -> Result<()> {
        let mut pending = lock(&self.pending);
        if pending.get(&key).is_some_and(|waiting| !waiting.is_closed()) {
            return Err(DispatchError::RequestInFlight(key));
        }
        pending.insert(key, tx);
        Ok(())
    }

    async fn write_frame(
        &self,
        frame: &[u8],
        reply_to: Option<(RequestKey, oneshot::Sender<C::Packet>)>,
    ) -> Result<()> {
        let mut throttle = self.send_gate.lock().await;
        let (gatt, interval) = {
            let codec = lock(&self.codec);
            (codec.gatt_profile(), codec.send_interval())
        };
        throttle.set_interval(interval);

        let wait = throttle.wait_time(Instant::now().into_std());
        if !wait.is_zero() {
            debug!("{}: throttling write for {:?}", self.address, wait);
            tokio::time::sleep(wait).await;
        }
        self.ensure_open()?;
        if let Some((key, tx)) = reply_to {
            self.register_request(key, tx)?;
        }

        throttle.record_send(Instant::now().into_std());
        trace!("{} -> {}", self.address, hex::encode(frame));
        self.transport.write(gatt.service, gatt.send, frame).await?;

        let mut stats = lock(&self.stats);
        stats.frames_sent += 1;
        stats.bytes_sent += frame.len() as u64;
        Ok(())
    }

    /// Feed one notification from the receive characteristic
    ///
    /// Returns the number of complete frames decoded. Bad frames are logged
    /// and counted, never returned as errors.
    pub fn handle_notification(&self, data: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        trace!("{} <- {}", self.address, hex::encode(data));

        let frames = {
            let mut receive = lock(&self.receive);
            if receive.push(data).is_err() {
                warn!(
                    "{}: receive buffer overflow, discarded stale bytes",
                    self.address
                );
                lock(&self.stats).overflows += 1;
            }
            let codec = lock(&self.codec);
            receive.drain_frames(|buffered| codec.frame_length(buffered))
        };

        {
            let mut stats = lock(&self.stats);
            stats.bytes_received += data.len() as u64;
            stats.frames_received += frames.len() as u64;
        }

        for frame in &frames {
            let result = {
                let mut codec = lock(&self.codec);
                let pending = lock(&self.pending);
                codec.decode(frame, &*pending)?
            };
            self.route(result, frame);
        }
        Ok(frames.len())
    }

    fn route(&self, result: ParsedResult<C::Packet, C::Listener>, frame: &[u8]) {
        let (kind, packet, callback) = result.into_parts();
        match (kind, packet) {
            (ResultKind::Reply, Some(packet)) => self.complete_request(packet),
            (ResultKind::ActiveEvent, Some(packet)) => match callback {
                Some(listener) => {
                    lock(&self.stats).events_delivered += 1;
                    listener.on_event(packet);
                }
                None => {
                    debug!("{}: no event listener, dropping event", self.address);
                    lock(&self.stats).events_dropped += 1;
                }
            },
            (ResultKind::Malformed, _) => {
                warn!("{}: malformed frame {}", self.address, hex::encode(frame));
                lock(&self.stats).malformed += 1;
            }
            _ => {
                warn!("{}: unrecognized frame {}", self.address, hex::encode(frame));
                lock(&self.stats).unrecognized += 1;
            }
        }
    }

    fn complete_request(&self, reply: C::Packet) {
        let key = lock(&self.codec).reply_key(&reply);
        let waiter = key.and_then(|key| lock(&self.pending).remove(&key));
        match waiter {
            Some(tx) => {
                lock(&self.stats).replies += 1;
                if tx.send(reply).is_err() {
                    debug!("{}: reply arrived after caller gave up", self.address);
                }
            }
            None => {
                debug!("{}: reply without waiting request", self.address);
                lock(&self.stats).unrecognized += 1;
            }
        }
    }

    /// Tear the session down: destroy the codec, fail waiting requests and
    /// drop buffered bytes. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        lock(&self.receive).clear();
        lock(&self.codec).destroy();
        let abandoned = {
            let mut pending = lock(&self.pending);
            let count = pending.len();
            pending.clear();
            count
        };
        info!(
            "{} session closed ({} pending requests abandoned)",
            self.address, abandoned
        );
    }
}

impl<C: ProtocolCodec, T: BleTransport> Drop for Dispatcher<C, T> {
    fn drop(&mut self) {
        self.close();
    }
}
