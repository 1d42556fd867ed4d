//! Loopback Host
//!
//! In-process [`HostStack`] with no radio behind it. Every call is journaled
//! so the traffic the peripheral produced can be inspected, and failures can
//! be injected per call kind or per device.

use crate::domain::gatt::{CharacteristicRef, GattDatabase, Properties, Service};
use crate::domain::uuids::descriptor;
use crate::infrastructure::bluetooth::host::{
    AttStatus, DeviceId, HostError, HostEvent, HostStack, RequestId, ServerHandle,
};
use crate::infrastructure::bluetooth::protocol::cccd;
use crate::infrastructure::bluetooth::service::{lock, PeripheralService};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

/// One journaled call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    OpenServer,
    CloseServer,
    SubmitService(Uuid),
    Notify {
        device: DeviceId,
        target: CharacteristicRef,
        value: Vec<u8>,
        indicate: bool,
    },
    ReadResponse {
        device: DeviceId,
        request: RequestId,
        status: AttStatus,
        offset: u16,
        value: Vec<u8>,
    },
    WriteAck {
        device: DeviceId,
        request: RequestId,
        status: AttStatus,
    },
}

#[derive(Default)]
struct Faults {
    next_submit: Option<HostError>,
    notify_devices: HashSet<DeviceId>,
}

pub struct LoopbackHost {
    auto_confirm: bool,
    next_handle: AtomicU64,
    journal: Mutex<Vec<HostCall>>,
    faults: Mutex<Faults>,
    events_tx: mpsc::UnboundedSender<HostEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<HostEvent>>>,
}

impl Default for LoopbackHost {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackHost {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            auto_confirm: false,
            next_handle: AtomicU64::new(1),
            journal: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Answer every accepted submission with a successful `ServiceAdded`.
    pub fn with_auto_confirm(mut self, auto_confirm: bool) -> Self {
        self.auto_confirm = auto_confirm;
        self
    }

    /// Take the stream of events this host generates. Only the first call
    /// gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<HostEvent>> {
        lock(&self.events_rx, "loopback events").take()
    }

    /// Inject an event as if the radio had produced it.
    pub fn inject(&self, event: HostEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Forward `events` into `peripheral` until the host is dropped.
    pub fn pump(
        mut events: mpsc::UnboundedReceiver<HostEvent>,
        peripheral: PeripheralService,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                trace!(?event, "loopback event");
                peripheral.handle_event(event);
            }
            debug!("loopback event pump finished");
        })
    }

    /// Play a central that connects and enables every subscribable
    /// characteristic, preferring notifications over indications.
    pub fn connect_central(&self, device: &DeviceId, database: &GattDatabase) -> usize {
        self.inject(HostEvent::Connected(device.clone()));
        let mut subscribed = 0;
        for (target, properties) in database.subscribable() {
            let value = if properties.contains(Properties::NOTIFY) {
                cccd::ENABLE_NOTIFICATION
            } else {
                cccd::ENABLE_INDICATION
            };
            self.inject(HostEvent::DescriptorWrite {
                device: device.clone(),
                request: RequestId(0),
                target,
                descriptor: descriptor::CLIENT_CHARACTERISTIC_CONFIGURATION,
                value: value.to_vec(),
                response_needed: false,
            });
            subscribed += 1;
        }
        debug!(%device, subscribed, "central connected");
        subscribed
    }

    pub fn disconnect_central(&self, device: &DeviceId) {
        self.inject(HostEvent::Disconnected(device.clone()));
    }

    pub fn fail_next_submit(&self, error: HostError) {
        lock(&self.faults, "loopback faults").next_submit = Some(error);
    }

    pub fn fail_notify_for(&self, device: DeviceId) {
        lock(&self.faults, "loopback faults").notify_devices.insert(device);
    }

    pub fn clear_faults(&self) {
        *lock(&self.faults, "loopback faults") = Faults::default();
    }

    fn record(&self, call: HostCall) {
        lock(&self.journal, "loopback journal").push(call);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        lock(&self.journal, "loopback journal").clone()
    }

    pub fn count(&self, predicate: impl Fn(&HostCall) -> bool) -> usize {
        lock(&self.journal, "loopback journal")
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    /// Services submitted, in order
    pub fn submitted(&self) -> Vec<Uuid> {
        lock(&self.journal, "loopback journal")
            .iter()
            .filter_map(|call| match call {
                HostCall::SubmitService(uuid) => Some(*uuid),
                _ => None,
            })
            .collect()
    }

    fn pushes(&self, target: &CharacteristicRef, indicate: bool) -> Vec<(DeviceId, Vec<u8>)> {
        lock(&self.journal, "loopback journal")
            .iter()
            .filter_map(|call| match call {
                HostCall::Notify {
                    device,
                    target: t,
                    value,
                    indicate: i,
                } if t == target && *i == indicate => Some((device.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Values notified for `target`, in order
    pub fn notifications(&self, target: &CharacteristicRef) -> Vec<Vec<u8>> {
        self.pushes(target, false).into_iter().map(|(_, v)| v).collect()
    }

    /// Values indicated for `target`, in order
    pub fn indications(&self, target: &CharacteristicRef) -> Vec<Vec<u8>> {
        self.pushes(target, true).into_iter().map(|(_, v)| v).collect()
    }

    /// Recipients of every push for `target`, in order
    pub fn notified_devices(&self, target: &CharacteristicRef) -> Vec<DeviceId> {
        let mut devices: Vec<_> = self.pushes(target, false).into_iter().map(|(d, _)| d).collect();
        devices.extend(self.pushes(target, true).into_iter().map(|(d, _)| d));
        devices
    }
}

impl HostStack for LoopbackHost {
    fn open_server(&self) -> Result<ServerHandle, HostError> {
        self.record(HostCall::OpenServer);
        Ok(ServerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    fn close_server(&self, _handle: ServerHandle) {
        self.record(HostCall::CloseServer);
    }

    fn submit_service(&self, _handle: ServerHandle, service: &Service) -> Result<(), HostError> {
        if let Some(error) = lock(&self.faults, "loopback faults").next_submit.take() {
            return Err(error);
        }
        self.record(HostCall::SubmitService(service.uuid()));
        if self.auto_confirm {
            self.inject(HostEvent::ServiceAdded {
                service: service.uuid(),
                success: true,
            });
        }
        Ok(())
    }

    fn notify(
        &self,
        _handle: ServerHandle,
        device: &DeviceId,
        characteristic: &CharacteristicRef,
        value: &[u8],
        indicate: bool,
    ) -> Result<(), HostError> {
        if lock(&self.faults, "loopback faults")
            .notify_devices
            .contains(device)
        {
            return Err(HostError::Transport(format!("{} is unreachable", device)));
        }
        self.record(HostCall::Notify {
            device: device.clone(),
            target: *characteristic,
            value: value.to_vec(),
            indicate,
        });
        Ok(())
    }

    fn send_read_response(
        &self,
        _handle: ServerHandle,
        device: &DeviceId,
        request: RequestId,
        status: AttStatus,
        offset: u16,
        value: &[u8],
    ) -> Result<(), HostError> {
        self.record(HostCall::ReadResponse {
            device: device.clone(),
            request,
            status,
            offset,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn send_write_ack(
        &self,
        _handle: ServerHandle,
        device: &DeviceId,
        request: RequestId,
        status: AttStatus,
    ) -> Result<(), HostError> {
        self.record(HostCall::WriteAck {
            device: device.clone(),
            request,
            status,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::standard_catalog;
    use crate::domain::codec::time::DateTime;
    use crate::domain::codec::MedicalFloat;
    use crate::domain::settings::DeviceInfoSettings;
    use crate::domain::uuids::{characteristic, service};

    fn battery() -> CharacteristicRef {
        CharacteristicRef::new(service::BATTERY, characteristic::BATTERY_LEVEL)
    }

    #[test]
    fn test_handles_increment() {
        let host = LoopbackHost::new();
        let first = host.open_server().unwrap();
        let second = host.open_server().unwrap();
        assert_ne!(first, second);
        assert_eq!(host.count(|c| matches!(c, HostCall::OpenServer)), 2);
    }

    #[test]
    fn test_events_taken_once() {
        let host = LoopbackHost::new();
        assert!(host.take_events().is_some());
        assert!(host.take_events().is_none());
    }

    #[test]
    fn test_auto_confirm_emits_service_added() {
        let host = LoopbackHost::new().with_auto_confirm(true);
        let mut events = host.take_events().unwrap();
        let handle = host.open_server().unwrap();
        host.submit_service(handle, &Service::primary(service::BATTERY))
            .unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            HostEvent::ServiceAdded {
                service: service::BATTERY,
                success: true,
            }
        );
        assert_eq!(host.submitted(), vec![service::BATTERY]);
    }

    #[test]
    fn test_injected_submit_failure_is_one_shot() {
        let host = LoopbackHost::new();
        let handle = host.open_server().unwrap();
        host.fail_next_submit(HostError::NoServer);

        let svc = Service::primary(service::BATTERY);
        assert_eq!(host.submit_service(handle, &svc), Err(HostError::NoServer));
        assert!(host.submit_service(handle, &svc).is_ok());
        assert_eq!(host.submitted().len(), 1);
    }

    #[test]
    fn test_notify_failure_is_per_device() {
        let host = LoopbackHost::new();
        let handle = host.open_server().unwrap();
        host.fail_notify_for(DeviceId::from("AA"));

        assert!(host
            .notify(handle, &DeviceId::from("AA"), &battery(), &[1], false)
            .is_err());
        host.notify(handle, &DeviceId::from("BB"), &battery(), &[2], false)
            .unwrap();
        host.notify(handle, &DeviceId::from("BB"), &battery(), &[3], true)
            .unwrap();

        assert_eq!(host.notifications(&battery()), vec![vec![2]]);
        assert_eq!(host.indications(&battery()), vec![vec![3]]);

        host.clear_faults();
        assert!(host
            .notify(handle, &DeviceId::from("AA"), &battery(), &[4], false)
            .is_ok());
    }

    #[test]
    fn test_central_subscribes_to_everything() {
        let host = LoopbackHost::new();
        let mut events = host.take_events().unwrap();
        let database = standard_catalog(
            &DeviceInfoSettings::default(),
            &DateTime::now(),
            MedicalFloat::Truncated,
        );
        let device = DeviceId::from("00:11:22:33:44:55");

        let subscribed = host.connect_central(&device, &database);
        assert_eq!(subscribed, database.subscribable().count());
        assert_eq!(events.try_recv().unwrap(), HostEvent::Connected(device.clone()));

        let mut writes = 0;
        while let Ok(event) = events.try_recv() {
            if let HostEvent::DescriptorWrite { target, value, .. } = event {
                writes += 1;
                if target.characteristic == characteristic::TEMPERATURE_MEASUREMENT {
                    assert_eq!(value, cccd::ENABLE_INDICATION.to_vec());
                }
                if target == battery() {
                    assert_eq!(value, cccd::ENABLE_NOTIFICATION.to_vec());
                }
            }
        }
        assert_eq!(writes, subscribed);
    }
}
