//! Host Stack Seam
//!
//! The peripheral never talks to a radio directly. Everything outbound goes
//! through [`HostStack`]; everything inbound arrives as a [`HostEvent`].

use crate::domain::gatt::{CharacteristicRef, Service};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier of a remote central
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Handle of an open GATT server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHandle(pub u64);

/// Correlates a response with the request that asked for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub u32);

/// ATT status codes returned in read responses and write acknowledgements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttStatus {
    Success = 0x00,
    ReadNotPermitted = 0x02,
    WriteNotPermitted = 0x03,
    RequestNotSupported = 0x06,
    InvalidOffset = 0x07,
    AttributeNotFound = 0x0A,
    InvalidAttributeValueLength = 0x0D,
    /// First application error code, used for rejected control point values
    ApplicationError = 0x80,
    CccdImproperlyConfigured = 0xFD,
    OutOfRange = 0xFF,
}

impl AttStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("GATT server is not open")]
    NoServer,
}

/// Outbound primitives of the BLE host stack.
///
/// Registration results are asynchronous: a successful `submit_service`
/// only means the request was accepted, the verdict arrives later as
/// [`HostEvent::ServiceAdded`].
pub trait HostStack: Send + Sync {
    fn open_server(&self) -> Result<ServerHandle, HostError>;

    fn close_server(&self, handle: ServerHandle);

    fn submit_service(&self, handle: ServerHandle, service: &Service) -> Result<(), HostError>;

    fn notify(
        &self,
        handle: ServerHandle,
        device: &DeviceId,
        characteristic: &CharacteristicRef,
        value: &[u8],
        indicate: bool,
    ) -> Result<(), HostError>;

    fn send_read_response(
        &self,
        handle: ServerHandle,
        device: &DeviceId,
        request: RequestId,
        status: AttStatus,
        offset: u16,
        value: &[u8],
    ) -> Result<(), HostError>;

    fn send_write_ack(
        &self,
        handle: ServerHandle,
        device: &DeviceId,
        request: RequestId,
        status: AttStatus,
    ) -> Result<(), HostError>;
}

/// Inbound callbacks from the host stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    ServiceAdded {
        service: Uuid,
        success: bool,
    },
    Connected(DeviceId),
    Disconnected(DeviceId),
    ConnectionError {
        device: DeviceId,
        status: u8,
    },
    CharacteristicRead {
        device: DeviceId,
        request: RequestId,
        target: CharacteristicRef,
        offset: u16,
    },
    CharacteristicWrite {
        device: DeviceId,
        request: RequestId,
        target: CharacteristicRef,
        value: Vec<u8>,
        response_needed: bool,
    },
    DescriptorWrite {
        device: DeviceId,
        request: RequestId,
        target: CharacteristicRef,
        descriptor: Uuid,
        value: Vec<u8>,
        response_needed: bool,
    },
}
