//! Peripheral Service
//!
//! Main coordinator. Owns the GATT database, the registration queue, the
//! subscription registry and the simulation scheduler, and is the only
//! component that talks to the [`HostStack`].

use crate::domain::gatt::{CharacteristicRef, GattDatabase, Service};
use crate::domain::models::{MessageSeverity, PeripheralEvent, StatusMessage};
use crate::domain::settings::SimulationSettings;
use crate::infrastructure::bluetooth::host::{DeviceId, HostError, HostEvent, HostStack, ServerHandle};
use crate::infrastructure::bluetooth::protocol::DispatchKind;
use crate::infrastructure::bluetooth::registration::{RegistrationQueue, RegistrationStep};
use crate::infrastructure::bluetooth::simulation::{self, Controls};
use crate::infrastructure::bluetooth::subscriptions::LinkRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &'static str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("{} lock was poisoned, recovering", what);
        poisoned.into_inner()
    })
}

#[derive(Default)]
struct Scheduler {
    stop: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    /// The running simulation was started by a connection, not by a caller
    automatic: bool,
    /// Bumped to cancel a pending connection-triggered start
    auto_generation: u64,
}

pub(crate) struct Inner {
    host: Arc<dyn HostStack>,
    database: GattDatabase,
    settings: SimulationSettings,
    controls: Controls,
    runtime: Handle,
    links: Mutex<LinkRegistry>,
    registration: Mutex<RegistrationQueue>,
    server: Mutex<Option<ServerHandle>>,
    simulating: AtomicBool,
    scheduler: Mutex<Scheduler>,
    event_sender: mpsc::UnboundedSender<PeripheralEvent>,
}

/// Cheap, cloneable handle to the simulated peripheral
#[derive(Clone)]
pub struct PeripheralService {
    inner: Arc<Inner>,
}

impl PeripheralService {
    /// Create a new peripheral over `host`. Background work (generators,
    /// delayed replies) is spawned on `runtime`.
    pub fn new(
        host: Arc<dyn HostStack>,
        database: GattDatabase,
        settings: SimulationSettings,
        event_sender: mpsc::UnboundedSender<PeripheralEvent>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                database,
                settings,
                controls: Controls::default(),
                runtime,
                links: Mutex::new(LinkRegistry::new()),
                registration: Mutex::new(RegistrationQueue::new()),
                server: Mutex::new(None),
                simulating: AtomicBool::new(false),
                scheduler: Mutex::new(Scheduler::default()),
                event_sender,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn database(&self) -> &GattDatabase {
        &self.inner.database
    }

    pub fn controls(&self) -> &Controls {
        &self.inner.controls
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.inner.settings
    }

    pub(crate) fn host(&self) -> &dyn HostStack {
        self.inner.host.as_ref()
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub(crate) fn links(&self) -> MutexGuard<'_, LinkRegistry> {
        lock(&self.inner.links, "subscription registry")
    }

    pub fn server(&self) -> Option<ServerHandle> {
        *lock(&self.inner.server, "server handle")
    }

    pub fn connected_count(&self) -> usize {
        self.links().connected_count()
    }

    pub fn is_registered(&self, service: &Uuid) -> bool {
        lock(&self.inner.registration, "registration queue").is_registered(service)
    }

    pub fn is_simulating(&self) -> bool {
        self.inner.simulating.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: PeripheralEvent) {
        let _ = self.inner.event_sender.send(event);
    }

    pub(crate) fn status(&self, message: impl Into<String>, severity: MessageSeverity) {
        self.emit(PeripheralEvent::Status(StatusMessage::new(message, severity)));
    }

    // ---- Server lifecycle -------------------------------------------------

    /// Open the GATT server. Opening twice is a no-op that returns the
    /// existing handle.
    pub fn open_server(&self) -> Result<ServerHandle, HostError> {
        let handle = {
            let mut server = lock(&self.inner.server, "server handle");
            if let Some(handle) = *server {
                warn!("GATT server already open, ignoring second open");
                return Ok(handle);
            }
            let handle = self.inner.host.open_server()?;
            *server = Some(handle);
            handle
        };
        info!(?handle, "GATT server opened");
        self.status("GATT server opened", MessageSeverity::Success);

        // Anything enqueued before the server existed can go out now
        let next = lock(&self.inner.registration, "registration queue").server_opened();
        if let Some(service) = next {
            self.submit(service);
        }
        Ok(handle)
    }

    /// Stop the simulation, forget all peers and registrations and close the
    /// server.
    pub fn close_server(&self) {
        self.stop();
        let Some(handle) = lock(&self.inner.server, "server handle").take() else {
            debug!("close_server called without an open server");
            return;
        };
        self.inner.host.close_server(handle);
        lock(&self.inner.registration, "registration queue").reset();
        self.links().clear();
        info!(?handle, "GATT server closed");
        self.status("GATT server closed", MessageSeverity::Info);
    }

    // ---- Registration -----------------------------------------------------

    /// Enqueue every service of the catalog, in catalog order.
    pub fn register_all_services(&self) {
        let services: Vec<Arc<Service>> = self.inner.database.services().to_vec();
        info!(count = services.len(), "Registering services");
        for service in services {
            self.enqueue(service);
        }
    }

    pub fn enqueue(&self, service: Arc<Service>) {
        let ready = lock(&self.inner.registration, "registration queue").enqueue(service);
        if let Some(service) = ready {
            self.submit(service);
        }
    }

    fn submit(&self, service: Arc<Service>) {
        let Some(handle) = self.server() else {
            warn!(service = %service.uuid(), "No server to submit to");
            let dropped = lock(&self.inner.registration, "registration queue").fail_in_flight();
            self.registration_failed(service.uuid(), dropped, "no server");
            return;
        };

        debug!(service = %service.uuid(), "Submitting service");
        if let Err(e) = self.inner.host.submit_service(handle, &service) {
            let dropped = lock(&self.inner.registration, "registration queue").fail_in_flight();
            self.registration_failed(service.uuid(), dropped, &e.to_string());
        }
    }

    fn on_service_added(&self, service: Uuid, success: bool) {
        let step = lock(&self.inner.registration, "registration queue").on_result(service, success);
        match step {
            RegistrationStep::Confirmed { next } => {
                info!(%service, "Service added");
                self.emit(PeripheralEvent::ServiceAdded(service));
                if let Some(next) = next {
                    self.submit(next);
                }
            }
            RegistrationStep::Failed { dropped } => {
                self.registration_failed(service, dropped, "rejected by host");
            }
            RegistrationStep::Ignored => {
                warn!(%service, success, "Registration result for a service that is not in flight");
            }
        }
    }

    fn registration_failed(&self, service: Uuid, dropped: usize, reason: &str) {
        error!(%service, dropped, "Service registration failed: {}", reason);
        self.status(
            format!("Failed to add service {}: {}", service, reason),
            MessageSeverity::Error,
        );
        self.emit(PeripheralEvent::RegistrationFailed { service, dropped });
    }

    // ---- Inbound events ---------------------------------------------------

    /// Apply one callback from the host stack.
    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::ServiceAdded { service, success } => self.on_service_added(service, success),
            HostEvent::Connected(device) => self.on_connected(device),
            HostEvent::Disconnected(device) => self.on_disconnected(device),
            HostEvent::ConnectionError { device, status } => {
                warn!(%device, status, "Connection error");
                self.on_disconnected(device);
            }
            HostEvent::CharacteristicRead {
                device,
                request,
                target,
                offset,
            } => self.on_characteristic_read(&device, request, target, offset),
            HostEvent::CharacteristicWrite {
                device,
                request,
                target,
                value,
                response_needed,
            } => self.on_characteristic_write(&device, request, target, value, response_needed),
            HostEvent::DescriptorWrite {
                device,
                request,
                target,
                descriptor,
                value,
                response_needed,
            } => self.on_descriptor_write(&device, request, target, descriptor, &value, response_needed),
        }
    }

    fn on_connected(&self, device: DeviceId) {
        let (added, count) = {
            let mut links = self.links();
            let added = links.connect(device.clone());
            (added, links.connected_count())
        };
        if !added {
            debug!(%device, "Device already connected");
            return;
        }

        info!(%device, count, "Device connected");
        self.emit(PeripheralEvent::DeviceConnected(device.to_string()));

        if count == 1 && self.inner.settings.auto_simulate_on_connect {
            let generation = {
                let mut scheduler = lock(&self.inner.scheduler, "scheduler");
                scheduler.auto_generation = scheduler.auto_generation.wrapping_add(1);
                scheduler.auto_generation
            };
            let peripheral = self.clone();
            let delay = self.inner.settings.connect_start_delay();
            self.inner.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                peripheral.auto_start(generation);
            });
        }
    }

    fn on_disconnected(&self, device: DeviceId) {
        let (removed, count) = {
            let mut links = self.links();
            let removed = links.disconnect(&device);
            (removed, links.connected_count())
        };
        if !removed {
            debug!(%device, "Disconnect for unknown device");
            return;
        }

        info!(%device, count, "Device disconnected");
        self.emit(PeripheralEvent::DeviceDisconnected(device.to_string()));

        if count == 0 && self.inner.settings.auto_simulate_on_connect {
            let mut scheduler = lock(&self.inner.scheduler, "scheduler");
            scheduler.auto_generation = scheduler.auto_generation.wrapping_add(1);
            if scheduler.automatic {
                self.stop_locked(scheduler);
            } else if scheduler.stop.is_some() {
                debug!("Simulation was started manually, leaving it running");
            }
        }
    }

    // ---- Notifier ---------------------------------------------------------

    /// Store `value` and push it to every subscriber of `kind`. Returns the
    /// number of devices the host accepted it for.
    pub fn publish(&self, target: &CharacteristicRef, value: Vec<u8>, kind: DispatchKind) -> usize {
        if let Err(e) = self.inner.database.set_value(target, value) {
            warn!("Cannot publish: {}", e);
            return 0;
        }
        self.dispatch(target, kind)
    }

    /// Push the current value of `target` to every connected device whose
    /// CCCD for it matches `kind`.
    pub fn dispatch(&self, target: &CharacteristicRef, kind: DispatchKind) -> usize {
        let Some(handle) = self.server() else {
            debug!(%target, "No server, skipping dispatch");
            return 0;
        };
        if !self.is_registered(&target.service) {
            warn!(%target, "Dispatch for a service the host has not confirmed");
            return 0;
        }
        let value = match self.inner.database.value(target) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot dispatch: {}", e);
                return 0;
            }
        };

        // Held for the whole fan-out so a disconnect cannot interleave
        let links = self.links();
        let mut delivered = 0;
        for device in links.subscribers(target, kind) {
            match self
                .inner
                .host
                .notify(handle, &device, target, &value, kind.is_indication())
            {
                Ok(()) => delivered += 1,
                Err(e) => warn!(%device, %target, "Notify failed: {}", e),
            }
        }
        delivered
    }

    /// Push `value` to one device only, if it subscribed for `kind`.
    pub(crate) fn notify_device(
        &self,
        device: &DeviceId,
        target: &CharacteristicRef,
        value: Vec<u8>,
        kind: DispatchKind,
    ) -> bool {
        let Some(handle) = self.server() else {
            return false;
        };
        if let Err(e) = self.inner.database.set_value(target, value.clone()) {
            warn!("Cannot reply: {}", e);
            return false;
        }

        let links = self.links();
        if !links.is_connected(device) || !links.mode(device, target).accepts(kind) {
            debug!(%device, %target, "Writer is not subscribed, reply stored only");
            return false;
        }
        match self
            .inner
            .host
            .notify(handle, device, target, &value, kind.is_indication())
        {
            Ok(()) => true,
            Err(e) => {
                warn!(%device, %target, "Reply failed: {}", e);
                false
            }
        }
    }

    // ---- Scheduler --------------------------------------------------------

    /// Start every generator. Returns `false` if already running.
    pub fn start(&self) -> bool {
        let scheduler = lock(&self.inner.scheduler, "scheduler");
        self.start_locked(scheduler, false)
    }

    fn auto_start(&self, generation: u64) {
        let scheduler = lock(&self.inner.scheduler, "scheduler");
        if scheduler.auto_generation != generation {
            debug!("Automatic start cancelled");
            return;
        }
        if self.connected_count() == 0 {
            return;
        }
        self.start_locked(scheduler, true);
    }

    fn start_locked(&self, mut scheduler: MutexGuard<'_, Scheduler>, automatic: bool) -> bool {
        if scheduler.stop.is_some() {
            debug!("Simulation already running");
            return false;
        }

        self.inner.simulating.store(true, Ordering::SeqCst);
        let (stop_tx, stop_rx) = watch::channel(false);
        for generator in simulation::standard_generators(&self.inner.settings) {
            let task = simulation::run_generator(generator, Arc::downgrade(&self.inner), stop_rx.clone());
            scheduler.tasks.push(self.inner.runtime.spawn(task));
        }
        scheduler.stop = Some(stop_tx);
        scheduler.automatic = automatic;
        drop(scheduler);

        info!(automatic, "Simulation started");
        self.emit(PeripheralEvent::SimulationStarted);
        true
    }

    /// Signal every generator to stop and cancel a pending automatic start.
    /// Returns `false` if nothing was running.
    pub fn stop(&self) -> bool {
        let mut scheduler = lock(&self.inner.scheduler, "scheduler");
        scheduler.auto_generation = scheduler.auto_generation.wrapping_add(1);
        self.stop_locked(scheduler)
    }

    fn stop_locked(&self, mut scheduler: MutexGuard<'_, Scheduler>) -> bool {
        let Some(stop) = scheduler.stop.take() else {
            return false;
        };

        scheduler.automatic = false;
        self.inner.simulating.store(false, Ordering::SeqCst);
        let _ = stop.send(true);
        let tasks = std::mem::take(&mut scheduler.tasks);
        drop(scheduler);

        debug!(tasks = tasks.len(), "Stopping generators");
        info!("Simulation stopped");
        self.emit(PeripheralEvent::SimulationStopped);
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::catalog::standard_catalog;
    use crate::domain::codec::time::DateTime;
    use crate::domain::codec::MedicalFloat;
    use crate::domain::settings::DeviceInfoSettings;
    use crate::domain::uuids::{characteristic as chr, descriptor, service as svc};
    use crate::infrastructure::bluetooth::host::RequestId;
    use crate::infrastructure::bluetooth::loopback::{HostCall, LoopbackHost};
    use crate::infrastructure::bluetooth::protocol::cccd;
    use std::time::Duration;

    pub(crate) struct Fixture {
        pub host: Arc<LoopbackHost>,
        pub peripheral: PeripheralService,
        pub events: mpsc::UnboundedReceiver<PeripheralEvent>,
    }

    pub(crate) fn fixture(auto_confirm: bool, settings: SimulationSettings) -> Fixture {
        let (event_tx, events) = mpsc::unbounded_channel();
        let host = Arc::new(LoopbackHost::new().with_auto_confirm(auto_confirm));
        let database = standard_catalog(
            &DeviceInfoSettings::default(),
            &DateTime::now(),
            MedicalFloat::Truncated,
        );
        let peripheral = PeripheralService::new(
            host.clone(),
            database,
            settings,
            event_tx,
            Handle::current(),
        );
        if auto_confirm {
            let events = host.take_events().expect("fresh host has events");
            LoopbackHost::pump(events, peripheral.clone());
        }
        Fixture {
            host,
            peripheral,
            events,
        }
    }

    /// Open, register and confirm everything synchronously.
    pub(crate) fn ready(settings: SimulationSettings) -> Fixture {
        let f = fixture(false, settings);
        f.peripheral.open_server().unwrap();
        f.peripheral.register_all_services();
        for service in f.peripheral.database().services().to_vec() {
            f.peripheral.handle_event(HostEvent::ServiceAdded {
                service: service.uuid(),
                success: true,
            });
        }
        f
    }

    pub(crate) fn subscribe(f: &Fixture, device: &str, target: CharacteristicRef, value: [u8; 2]) {
        f.peripheral.handle_event(HostEvent::DescriptorWrite {
            device: device.into(),
            request: RequestId(1),
            target,
            descriptor: descriptor::CLIENT_CHARACTERISTIC_CONFIGURATION,
            value: value.to_vec(),
            response_needed: false,
        });
    }

    fn manual() -> SimulationSettings {
        SimulationSettings {
            auto_simulate_on_connect: false,
            ..SimulationSettings::default()
        }
    }

    fn battery() -> CharacteristicRef {
        CharacteristicRef::new(svc::BATTERY, chr::BATTERY_LEVEL)
    }

    #[tokio::test]
    async fn test_open_server_twice_is_noop() {
        let f = fixture(false, manual());
        let first = f.peripheral.open_server().unwrap();
        let second = f.peripheral.open_server().unwrap();
        assert_eq!(first, second);
        assert_eq!(f.host.count(|c| matches!(c, HostCall::OpenServer)), 1);
    }

    #[tokio::test]
    async fn test_registration_is_sequential() {
        let f = fixture(false, manual());
        f.peripheral.open_server().unwrap();
        f.peripheral.register_all_services();

        let services = f.peripheral.database().services().to_vec();
        assert_eq!(f.host.submitted(), vec![services[0].uuid()]);

        f.peripheral.handle_event(HostEvent::ServiceAdded {
            service: services[0].uuid(),
            success: true,
        });
        assert_eq!(f.host.submitted(), vec![services[0].uuid(), services[1].uuid()]);

        f.peripheral.handle_event(HostEvent::ServiceAdded {
            service: services[1].uuid(),
            success: false,
        });
        for service in &services[2..] {
            f.peripheral.handle_event(HostEvent::ServiceAdded {
                service: service.uuid(),
                success: true,
            });
        }
        assert_eq!(f.host.submitted().len(), 2);
        assert!(f.peripheral.is_registered(&services[0].uuid()));
        assert!(!f.peripheral.is_registered(&services[1].uuid()));
    }

    #[tokio::test]
    async fn test_enqueue_before_open_waits_for_server() {
        let f = fixture(false, manual());
        f.peripheral.register_all_services();
        assert!(f.host.submitted().is_empty());

        f.peripheral.open_server().unwrap();
        assert_eq!(f.host.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_error_drains_queue() {
        let f = fixture(false, manual());
        f.peripheral.open_server().unwrap();
        f.host.fail_next_submit(HostError::Permission("BLUETOOTH_CONNECT".into()));
        f.peripheral.register_all_services();

        assert!(f.host.submitted().is_empty());
        let mut events = f.events;
        let mut failed = None;
        while let Ok(event) = events.try_recv() {
            if let PeripheralEvent::RegistrationFailed { dropped, .. } = event {
                failed = Some(dropped);
            }
        }
        assert_eq!(failed, Some(f.peripheral.database().services().len() - 1));
    }

    #[tokio::test]
    async fn test_loopback_auto_confirms_everything() {
        let f = fixture(true, manual());
        f.peripheral.open_server().unwrap();
        f.peripheral.register_all_services();

        let expected = f.peripheral.database().services().len();
        for _ in 0..100 {
            if f.host.submitted().len() == expected
                && f.peripheral.database().services().iter().all(|s| f.peripheral.is_registered(&s.uuid()))
            {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.host.submitted().len(), expected);
        assert!(f.peripheral.is_registered(&svc::SCALE));
    }

    #[tokio::test]
    async fn test_only_subscribed_connected_devices_are_notified() {
        let f = ready(manual());
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        f.peripheral.handle_event(HostEvent::Connected("BB".into()));
        subscribe(&f, "AA", battery(), cccd::ENABLE_NOTIFICATION);

        let delivered = f.peripheral.publish(&battery(), vec![55], DispatchKind::Notify);
        assert_eq!(delivered, 1);
        assert_eq!(f.host.notified_devices(&battery()), vec![DeviceId::from("AA")]);

        // Wrong kind
        assert_eq!(f.peripheral.dispatch(&battery(), DispatchKind::Indicate), 0);
    }

    #[tokio::test]
    async fn test_disconnected_device_is_not_notified() {
        let f = ready(manual());
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        subscribe(&f, "AA", battery(), cccd::ENABLE_NOTIFICATION);
        f.peripheral.handle_event(HostEvent::Disconnected("AA".into()));

        assert_eq!(f.peripheral.publish(&battery(), vec![10], DispatchKind::Notify), 0);
        assert!(f.host.notified_devices(&battery()).is_empty());
        assert_eq!(f.peripheral.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_error_removes_device() {
        let f = ready(manual());
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        f.peripheral.handle_event(HostEvent::ConnectionError {
            device: "AA".into(),
            status: 0x08,
        });
        assert_eq!(f.peripheral.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_notify_failure_does_not_stop_fan_out() {
        let f = ready(manual());
        for device in ["AA", "BB", "CC"] {
            f.peripheral.handle_event(HostEvent::Connected(device.into()));
            subscribe(&f, device, battery(), cccd::ENABLE_NOTIFICATION);
        }
        f.host.fail_notify_for(DeviceId::from("AA"));

        assert_eq!(f.peripheral.publish(&battery(), vec![42], DispatchKind::Notify), 2);
        assert_eq!(
            f.host.notified_devices(&battery()),
            vec![DeviceId::from("BB"), DeviceId::from("CC")]
        );
    }

    #[tokio::test]
    async fn test_unconfirmed_service_is_not_dispatched() {
        let f = fixture(false, manual());
        f.peripheral.open_server().unwrap();
        f.peripheral.register_all_services();
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        subscribe(&f, "AA", battery(), cccd::ENABLE_NOTIFICATION);

        // Battery is first in the catalog and still in flight
        assert_eq!(f.peripheral.publish(&battery(), vec![1], DispatchKind::Notify), 0);
        assert_eq!(f.peripheral.database().value(&battery()).unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_scheduler() {
        let f = ready(manual());
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        subscribe(&f, "AA", battery(), cccd::ENABLE_NOTIFICATION);

        assert!(f.peripheral.start());
        assert!(!f.peripheral.start());

        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_first = f.host.notified_devices(&battery()).len();
        assert_eq!(after_first, 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(f.host.notified_devices(&battery()).len(), 2);

        assert!(f.peripheral.stop());
        assert!(!f.peripheral.is_simulating());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.host.notified_devices(&battery()).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_simulation_follows_connections() {
        let f = ready(SimulationSettings::default());
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        assert!(!f.peripheral.is_simulating());

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(f.peripheral.is_simulating());

        f.peripheral.handle_event(HostEvent::Disconnected("AA".into()));
        assert!(!f.peripheral.is_simulating());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_server_stops_everything() {
        let f = ready(manual());
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        f.peripheral.start();

        f.peripheral.close_server();
        assert!(!f.peripheral.is_simulating());
        assert_eq!(f.peripheral.connected_count(), 0);
        assert!(f.peripheral.server().is_none());
        assert!(!f.peripheral.is_registered(&svc::BATTERY));
        assert_eq!(f.host.count(|c| matches!(c, HostCall::CloseServer)), 1);
    }

    #[tokio::test]
    async fn test_second_registration_pass_is_ignored() {
        let f = ready(manual());
        let catalog = f.peripheral.database().services().len();
        assert_eq!(f.host.submitted().len(), catalog);

        f.peripheral.register_all_services();
        assert_eq!(f.host.submitted().len(), catalog);
        assert!(f.peripheral.is_registered(&svc::BATTERY));
    }

    #[tokio::test]
    async fn test_write_to_queued_service_does_not_jump_the_queue() {
        let f = fixture(false, manual());
        f.peripheral.open_server().unwrap();
        f.peripheral.register_all_services();
        let services = f.peripheral.database().services().to_vec();
        let (first, second) = (services[0].uuid(), services[1].uuid());
        assert_eq!(second, svc::HEART_RATE);

        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        f.peripheral.handle_event(HostEvent::CharacteristicWrite {
            device: "AA".into(),
            request: RequestId(9),
            target: CharacteristicRef::new(svc::HEART_RATE, chr::HEART_RATE_CONTROL_POINT),
            value: vec![0x01],
            response_needed: true,
        });
        assert_eq!(f.host.submitted(), vec![first]);
        assert!(!f.peripheral.is_registered(&second));

        f.peripheral.handle_event(HostEvent::ServiceAdded {
            service: first,
            success: true,
        });
        assert_eq!(f.host.submitted(), vec![first, second]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_glucose_sequence_continues_after_restart() {
        let f = ready(manual());
        let glucose = CharacteristicRef::new(svc::GLUCOSE, chr::GLUCOSE_MEASUREMENT);
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        subscribe(&f, "AA", glucose, cccd::ENABLE_INDICATION);

        f.peripheral.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.peripheral.stop();
        f.peripheral.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sequences: Vec<u16> = f
            .host
            .indications(&glucose)
            .iter()
            .map(|value| u16::from_le_bytes([value[1], value[2]]))
            .collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_auto_start() {
        let f = ready(SimulationSettings::default());
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!f.peripheral.stop());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!f.peripheral.is_simulating());
        assert_eq!(f.peripheral.connected_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_disconnect_keeps_manual_simulation() {
        let f = ready(SimulationSettings::default());
        assert!(f.peripheral.start());
        f.peripheral.handle_event(HostEvent::Connected("AA".into()));
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        f.peripheral.handle_event(HostEvent::Disconnected("AA".into()));
        assert!(f.peripheral.is_simulating());
        assert!(f.peripheral.stop());
    }
}
