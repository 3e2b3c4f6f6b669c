//! # Device Controller
//!
//! Process-wide bookkeeping of connected external devices. The platform layer
//! reports connection changes and adapter power changes; the controller keeps
//! one session per MAC address and tears it down on disconnect.
//!
//! Sessions are held as [`DeviceSession`] trait objects so devices speaking
//! different protocols share one registry. Callers that need typed access
//! (sending packets, registering listeners) keep their own
//! `Arc<Dispatcher<..>>` alongside.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use exdevice_protocol::{is_ex_device, GattProfile, ProtocolCodec, ProtocolType};
use log::{debug, info};

use crate::dispatcher::{DispatchStats, Dispatcher};
use crate::transport::BleTransport;

/// Protocol-independent view of one connected device
pub trait DeviceSession: Send + Sync {
    fn address(&self) -> &str;
    fn protocol_type(&self) -> ProtocolType;
    fn gatt_profile(&self) -> GattProfile;
    fn stats(&self) -> DispatchStats;
    /// Tear the session down; idempotent
    fn close(&self);
    fn is_closed(&self) -> bool;
}

impl<C: ProtocolCodec, T: BleTransport> DeviceSession for Dispatcher<C, T> {
    fn address(&self) -> &str {
        Dispatcher::address(self)
    }

    fn protocol_type(&self) -> ProtocolType {
        Dispatcher::protocol_type(self)
    }

    fn gatt_profile(&self) -> GattProfile {
        Dispatcher::gatt_profile(self)
    }

    fn stats(&self) -> DispatchStats {
        Dispatcher::stats(self)
    }

    fn close(&self) {
        Dispatcher::close(self)
    }

    fn is_closed(&self) -> bool {
        Dispatcher::is_closed(self)
    }
}

/// Bluetooth adapter power state reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    On,
    Off,
    TurningOn,
    TurningOff,
}

/// Observer of adapter power changes
pub trait AdapterStateListener: Send + Sync {
    fn on_bluetooth_open(&self);
    fn on_bluetooth_close(&self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of connected sessions and adapter-state observers
#[derive(Default)]
pub struct DeviceController {
    sessions: Mutex<HashMap<String, Arc<dyn DeviceSession>>>,
    state_listeners: Mutex<Vec<Arc<dyn AdapterStateListener>>>,
}

impl DeviceController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an advertised name belongs to a supported external device
    pub fn is_ex_device(&self, ble_name: &str) -> bool {
        is_ex_device(ble_name)
    }

    /// Register a freshly connected session
    ///
    /// A previous session for the same address is closed and returned.
    pub fn attach(&self, session: Arc<dyn DeviceSession>) -> Option<Arc<dyn DeviceSession>> {
        let address = session.address().to_owned();
        info!("{} connected ({})", address, session.protocol_type());
        let previous = lock(&self.sessions).insert(address, session);
        if let Some(old) = &previous {
            debug!("{} replaced a stale session", old.address());
            old.close();
        }
        previous
    }

    /// Forget and close the session for `address`; returns whether one existed
    pub fn detach(&self, address: &str) -> bool {
        let removed = lock(&self.sessions).remove(address);
        match removed {
            Some(session) => {
                session.close();
                info!("{} disconnected", address);
                true
            }
            None => false,
        }
    }

    pub fn session(&self, address: &str) -> Option<Arc<dyn DeviceSession>> {
        lock(&self.sessions).get(address).cloned()
    }

    pub fn connected_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Close and forget every session
    pub fn close_all(&self) {
        let sessions: Vec<_> = lock(&self.sessions).drain().collect();
        for (address, session) in sessions {
            session.close();
            debug!("{} closed", address);
        }
    }

    /// Add an adapter-state observer; registering the same one twice is a no-op
    pub fn register_state_listener(&self, listener: Arc<dyn AdapterStateListener>) {
        let mut listeners = lock(&self.state_listeners);
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn unregister_state_listener(&self, listener: &Arc<dyn AdapterStateListener>) {
        lock(&self.state_listeners).retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Forward an adapter power change to every observer
    pub fn notify_adapter_state(&self, state: AdapterState) {
        let listeners = lock(&self.state_listeners).clone();
        debug!("adapter state {:?}", state);
        match state {
            AdapterState::On => listeners.iter().for_each(|l| l.on_bluetooth_open()),
            AdapterState::Off => listeners.iter().for_each(|l| l.on_bluetooth_close()),
            AdapterState::TurningOn | AdapterState::TurningOff => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FakeSession {
        address: String,
        closed: AtomicBool,
    }

    impl FakeSession {
        fn new(address: &str) -> Arc<Self> {
            Arc::new(Self {
                address: address.into(),
                closed: AtomicBool::new(false),
            })
        }
    }

    impl DeviceSession for FakeSession {
        fn address(&self) -> &str {
            &self.address
        }

        fn protocol_type(&self) -> ProtocolType {
            ProtocolType(7)
        }

        fn gatt_profile(&self) -> GattProfile {
            GattProfile::baseline()
        }

        fn stats(&self) -> DispatchStats {
            DispatchStats::default()
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct PowerWatcher {
        opened: AtomicU32,
        closed: AtomicU32,
    }

    impl AdapterStateListener for PowerWatcher {
        fn on_bluetooth_open(&self) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }

        fn on_bluetooth_close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_detach_closes_session() {
        let controller = DeviceController::new();
        let session = FakeSession::new("AA:BB:CC:DD:EE:01");
        controller.attach(session.clone());

        assert!(controller.session("AA:BB:CC:DD:EE:01").is_some());
        assert!(controller.detach("AA:BB:CC:DD:EE:01"));
        assert!(session.is_closed());
        assert!(!controller.detach("AA:BB:CC:DD:EE:01"));
        assert!(controller.connected_addresses().is_empty());
    }

    #[test]
    fn test_reattach_closes_stale_session() {
        let controller = DeviceController::new();
        let stale = FakeSession::new("AA:BB:CC:DD:EE:01");
        let fresh = FakeSession::new("AA:BB:CC:DD:EE:01");

        assert!(controller.attach(stale.clone()).is_none());
        assert!(controller.attach(fresh.clone()).is_some());
        assert!(stale.is_closed());
        assert!(!fresh.is_closed());
    }

    #[test]
    fn test_close_all() {
        let controller = DeviceController::new();
        let a = FakeSession::new("AA:BB:CC:DD:EE:02");
        let b = FakeSession::new("AA:BB:CC:DD:EE:01");
        controller.attach(a.clone());
        controller.attach(b.clone());
        assert_eq!(
            controller.connected_addresses(),
            vec!["AA:BB:CC:DD:EE:01", "AA:BB:CC:DD:EE:02"]
        );

        controller.close_all();
        assert!(a.is_closed() && b.is_closed());
        assert!(controller.connected_addresses().is_empty());
    }

    #[test]
    fn test_adapter_state_listeners() {
        let controller = DeviceController::new();
        let watcher = Arc::new(PowerWatcher::default());
        let listener: Arc<dyn AdapterStateListener> = watcher.clone();
        controller.register_state_listener(listener.clone());
        controller.register_state_listener(listener.clone());

        controller.notify_adapter_state(AdapterState::On);
        controller.notify_adapter_state(AdapterState::TurningOff);
        controller.notify_adapter_state(AdapterState::Off);
        assert_eq!(watcher.opened.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.closed.load(Ordering::SeqCst), 1);

        controller.unregister_state_listener(&listener);
        controller.notify_adapter_state(AdapterState::On);
        assert_eq!(watcher.opened.load(Ordering::SeqCst), 1);
    }

    struct NullTransport;

    impl BleTransport for NullTransport {
        fn write(
            &self,
            _service: uuid::Uuid,
            _characteristic: uuid::Uuid,
            _data: &[u8],
        ) -> impl std::future::Future<Output = Result<(), crate::TransportError>> + Send {
            async { Ok(()) }
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_dispatcher_as_session() {
        let codec = exdevice_protocol::ChecksumFrameCodec::new(ProtocolType(3));
        let dispatcher = Arc::new(
            Dispatcher::new(
                "AA:BB:CC:DD:EE:03",
                codec,
                NullTransport,
                crate::DispatchConfig::default(),
            )
            .unwrap(),
        );
        let controller = DeviceController::new();
        controller.attach(dispatcher.clone());

        let session = controller.session("AA:BB:CC:DD:EE:03").unwrap();
        assert_eq!(session.protocol_type(), ProtocolType(3));
        assert_eq!(session.gatt_profile(), GattProfile::baseline());

        controller.detach("AA:BB:CC:DD:EE:03");
        assert!(dispatcher.is_closed());
        assert!(dispatcher.with_codec(|codec| codec.is_destroyed()));
    }

    #[test]
    fn test_is_ex_device() {
        let controller = DeviceController::new();
        assert!(controller.is_ex_device("SKG_AOJ-30B"));
        assert!(!controller.is_ex_device("unknown"));
    }
}
