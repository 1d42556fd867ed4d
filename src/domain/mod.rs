//! Domain Layer
//!
//! Pure model code: UUIDs, value codecs, the GATT catalog and settings.
//! Nothing in here performs I/O apart from settings persistence.

pub mod catalog;
pub mod codec;
pub mod gatt;
pub mod models;
pub mod settings;
pub mod uuids;
