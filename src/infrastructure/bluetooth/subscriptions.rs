//! Subscription Registry
//!
//! Connected peers and their per-characteristic CCCD state. Both live in
//! one structure so a single lock covers connect, disconnect, CCCD writes
//! and dispatch.

use crate::domain::gatt::CharacteristicRef;
use crate::infrastructure::bluetooth::host::DeviceId;
use crate::infrastructure::bluetooth::protocol::{DispatchKind, SubscriptionMode};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct LinkRegistry {
    connected: BTreeSet<DeviceId>,
    subscriptions: HashMap<(DeviceId, CharacteristicRef), SubscriptionMode>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the device was not already connected.
    pub fn connect(&mut self, device: DeviceId) -> bool {
        self.connected.insert(device)
    }

    /// Remove the device and every subscription it held. Returns `true` if
    /// it was connected.
    pub fn disconnect(&mut self, device: &DeviceId) -> bool {
        self.subscriptions.retain(|(owner, _), _| owner != device);
        self.connected.remove(device)
    }

    pub fn is_connected(&self, device: &DeviceId) -> bool {
        self.connected.contains(device)
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    /// Overwrite the CCCD state for `(device, characteristic)`.
    pub fn record(&mut self, device: DeviceId, characteristic: CharacteristicRef, mode: SubscriptionMode) {
        if mode == SubscriptionMode::Disabled {
            self.subscriptions.remove(&(device, characteristic));
        } else {
            self.subscriptions.insert((device, characteristic), mode);
        }
    }

    pub fn mode(&self, device: &DeviceId, characteristic: &CharacteristicRef) -> SubscriptionMode {
        self.subscriptions
            .get(&(device.clone(), *characteristic))
            .copied()
            .unwrap_or_default()
    }

    /// Connected devices whose subscription to `characteristic` accepts `kind`
    pub fn subscribers(&self, characteristic: &CharacteristicRef, kind: DispatchKind) -> Vec<DeviceId> {
        self.connected
            .iter()
            .filter(|device| self.mode(device, characteristic).accepts(kind))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.connected.clear();
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::uuids::{characteristic, service};

    fn heart_rate() -> CharacteristicRef {
        CharacteristicRef::new(service::HEART_RATE, characteristic::HEART_RATE_MEASUREMENT)
    }

    fn battery() -> CharacteristicRef {
        CharacteristicRef::new(service::BATTERY, characteristic::BATTERY_LEVEL)
    }

    #[test]
    fn test_never_subscribed_is_never_a_subscriber() {
        let mut links = LinkRegistry::new();
        links.connect(DeviceId::from("AA"));
        links.connect(DeviceId::from("BB"));
        links.record(DeviceId::from("AA"), heart_rate(), SubscriptionMode::Notify);

        assert_eq!(
            links.subscribers(&heart_rate(), DispatchKind::Notify),
            vec![DeviceId::from("AA")]
        );
        assert!(links.subscribers(&battery(), DispatchKind::Notify).is_empty());
    }

    #[test]
    fn test_state_is_per_device() {
        let mut links = LinkRegistry::new();
        links.connect(DeviceId::from("AA"));
        links.connect(DeviceId::from("BB"));
        links.record(DeviceId::from("AA"), heart_rate(), SubscriptionMode::Notify);
        links.record(DeviceId::from("BB"), heart_rate(), SubscriptionMode::Indicate);

        assert_eq!(
            links.subscribers(&heart_rate(), DispatchKind::Indicate),
            vec![DeviceId::from("BB")]
        );

        links.record(DeviceId::from("AA"), heart_rate(), SubscriptionMode::Disabled);
        assert!(links.subscribers(&heart_rate(), DispatchKind::Notify).is_empty());
        assert_eq!(links.mode(&DeviceId::from("BB"), &heart_rate()), SubscriptionMode::Indicate);
    }

    #[test]
    fn test_disconnect_drops_subscriptions() {
        let mut links = LinkRegistry::new();
        let device = DeviceId::from("AA");
        links.connect(device.clone());
        links.record(device.clone(), heart_rate(), SubscriptionMode::Notify);

        assert!(links.disconnect(&device));
        assert!(!links.is_connected(&device));
        assert!(links.subscribers(&heart_rate(), DispatchKind::Notify).is_empty());

        // Reconnecting does not resurrect the old CCCD state
        links.connect(device.clone());
        assert!(links.subscribers(&heart_rate(), DispatchKind::Notify).is_empty());
    }

    #[test]
    fn test_subscription_of_unconnected_device_is_not_dispatched() {
        let mut links = LinkRegistry::new();
        links.record(DeviceId::from("ZZ"), battery(), SubscriptionMode::Notify);
        assert!(links.subscribers(&battery(), DispatchKind::Notify).is_empty());
    }
}
