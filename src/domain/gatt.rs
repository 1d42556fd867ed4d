//! GATT Model
//!
//! In-memory catalog of the services, characteristics and descriptors the
//! peripheral exposes. Services are immutable once built; characteristic
//! values are the only mutable state and sit behind their own lock.

use crate::domain::uuids::descriptor;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GattError {
    #[error("unknown service {0}")]
    UnknownService(Uuid),
    #[error("unknown characteristic {0}")]
    UnknownCharacteristic(CharacteristicRef),
}

/// Address of a characteristic: owning service plus characteristic UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicRef {
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

impl fmt::Display for CharacteristicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

bitflags::bitflags! {
    /// Characteristic properties as carried in the declaration
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Properties: u8 {
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
    }
}

impl Properties {
    pub const fn is_readable(self) -> bool {
        self.contains(Self::READ)
    }

    pub const fn is_writable(self) -> bool {
        self.intersects(Self::WRITE.union(Self::WRITE_WITHOUT_RESPONSE))
    }

    /// Whether a client can subscribe (notify or indicate)
    pub const fn is_subscribable(self) -> bool {
        self.intersects(Self::NOTIFY.union(Self::INDICATE))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Primary,
    Secondary,
}

/// A descriptor with a static value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub writable: bool,
    pub value: Vec<u8>,
}

impl Descriptor {
    /// Client Characteristic Configuration. Per-peer state is tracked by the
    /// subscription registry, not in this value.
    pub fn cccd() -> Self {
        Self {
            uuid: descriptor::CLIENT_CHARACTERISTIC_CONFIGURATION,
            writable: true,
            value: vec![0x00, 0x00],
        }
    }

    /// Valid Range for a `u16` characteristic
    pub fn valid_range_u16(lower: u16, upper: u16) -> Self {
        let mut value = Vec::with_capacity(4);
        value.extend_from_slice(&lower.to_le_bytes());
        value.extend_from_slice(&upper.to_le_bytes());
        Self {
            uuid: descriptor::VALID_RANGE,
            writable: false,
            value,
        }
    }

    pub fn user_description(text: &str) -> Self {
        Self {
            uuid: descriptor::USER_DESCRIPTION,
            writable: false,
            value: text.as_bytes().to_vec(),
        }
    }

    /// Decode a `u16` Valid Range as `(lower, upper)`
    pub fn as_u16_range(&self) -> Option<(u16, u16)> {
        match self.value.as_slice() {
            [lo0, lo1, hi0, hi1] => Some((
                u16::from_le_bytes([*lo0, *lo1]),
                u16::from_le_bytes([*hi0, *hi1]),
            )),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Characteristic {
    uuid: Uuid,
    properties: Properties,
    value: RwLock<Vec<u8>>,
    descriptors: Vec<Descriptor>,
}

impl Characteristic {
    /// Create a characteristic; subscribable ones get a CCCD.
    pub fn new(uuid: Uuid, properties: Properties) -> Self {
        let descriptors = if properties.is_subscribable() {
            vec![Descriptor::cccd()]
        } else {
            Vec::new()
        };
        Self {
            uuid,
            properties,
            value: RwLock::new(Vec::new()),
            descriptors,
        }
    }

    pub fn with_value(self, value: impl Into<Vec<u8>>) -> Self {
        self.set_value(value.into());
        self
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn properties(&self) -> Properties {
        self.properties
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, uuid: &Uuid) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.uuid == *uuid)
    }

    /// Snapshot of the current value
    pub fn value(&self) -> Vec<u8> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current value (last write wins)
    pub fn set_value(&self, value: Vec<u8>) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

#[derive(Debug)]
pub struct Service {
    uuid: Uuid,
    kind: ServiceKind,
    characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn primary(uuid: Uuid) -> Self {
        Self {
            uuid,
            kind: ServiceKind::Primary,
            characteristics: Vec::new(),
        }
    }

    pub fn secondary(uuid: Uuid) -> Self {
        Self {
            uuid,
            kind: ServiceKind::Secondary,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub fn characteristic(&self, uuid: &Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

/// The full set of services exposed by the peripheral
#[derive(Debug, Default)]
pub struct GattDatabase {
    services: Vec<Arc<Service>>,
}

impl GattDatabase {
    pub fn new(services: Vec<Service>) -> Self {
        Self {
            services: services.into_iter().map(Arc::new).collect(),
        }
    }

    /// All services, in registration order
    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    pub fn service(&self, uuid: &Uuid) -> Result<&Arc<Service>, GattError> {
        self.services
            .iter()
            .find(|s| s.uuid == *uuid)
            .ok_or(GattError::UnknownService(*uuid))
    }

    pub fn characteristic(&self, target: &CharacteristicRef) -> Result<&Characteristic, GattError> {
        self.service(&target.service)
            .ok()
            .and_then(|s| s.characteristic(&target.characteristic))
            .ok_or(GattError::UnknownCharacteristic(*target))
    }

    pub fn value(&self, target: &CharacteristicRef) -> Result<Vec<u8>, GattError> {
        self.characteristic(target).map(Characteristic::value)
    }

    pub fn set_value(&self, target: &CharacteristicRef, value: Vec<u8>) -> Result<(), GattError> {
        self.characteristic(target)?.set_value(value);
        Ok(())
    }

    /// Every characteristic a client can subscribe to
    pub fn subscribable(&self) -> impl Iterator<Item = (CharacteristicRef, Properties)> + '_ {
        self.services.iter().flat_map(|service| {
            service
                .characteristics
                .iter()
                .filter(|c| c.properties.is_subscribable())
                .map(move |c| (CharacteristicRef::new(service.uuid, c.uuid), c.properties))
        })
    }
}
