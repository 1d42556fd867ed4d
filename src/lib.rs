//! Simulated BLE GATT peripheral
//!
//! Exposes a catalog of standard and proprietary GATT services, keeps their
//! values moving with periodic generators and pushes them to subscribed
//! centrals through a pluggable host stack.

pub mod domain;
pub mod infrastructure;
