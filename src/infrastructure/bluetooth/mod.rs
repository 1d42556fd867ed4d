//! Bluetooth Module
//!
//! Simulated GATT peripheral: hosts the standard catalog, answers client
//! requests and pushes generated measurements to subscribers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   PeripheralService                      │
//! │  (Coordinator - server lifecycle, events, fan-out)       │
//! └──────┬──────────────┬──────────────┬──────────────┬─────┘
//!        │              │              │              │
//!        ▼              ▼              ▼              ▼
//! ┌────────────┐ ┌─────────────┐ ┌────────────┐ ┌────────────┐
//! │Registration│ │Subscriptions│ │ Dispatcher │ │ Simulation │
//! │            │ │             │ │            │ │            │
//! │ - one at a │ │ - connected │ │ - reads    │ │ - periodic │
//! │   time     │ │   peers     │ │ - writes   │ │   samples  │
//! │ - confirm  │ │ - CCCD      │ │ - control  │ │ - controls │
//! └────────────┘ └─────────────┘ └────────────┘ └────────────┘
//!        │
//!        ▼
//! ┌─────────────────────────────┐
//! │  HostStack (host / loopback)│
//! └─────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`host`] - Seam to the platform BLE stack
//! - [`loopback`] - In-process host used by the binary and the tests
//! - [`protocol`] - CCCD values and control point command parsing
//! - [`registration`] - Sequential service registration queue
//! - [`subscriptions`] - Connected devices and their CCCD state
//! - [`simulation`] - Measurement generators and the shared controls
//! - [`service`] - Main coordinator
//! - `dispatcher` - Read, write and descriptor request handling

mod dispatcher;
pub mod host;
pub mod loopback;
pub mod protocol;
pub mod registration;
pub mod service;
pub mod simulation;
pub mod subscriptions;

pub use host::{HostEvent, HostStack};
pub use loopback::LoopbackHost;
pub use service::PeripheralService;
