//! # vhal-core
//!
//! Shared library for the vehicle HAL emulator containing the property data
//! model and the emulator protocol codec.
//!
//! It has zero dependencies on OS APIs or network sockets; the emulator crate
//! supplies the transports and the property store.
//!
//! # Architecture overview
//!
//! A vehicle HAL exposes *properties*: typed values (gear, speed, cabin
//! temperature) addressed by a property id and an area id (a seat, a door,
//! or the whole vehicle). This crate defines:
//!
//! - **`domain`** – Property values, property configurations and the batched
//!   get/set request types exchanged with the HAL client.
//!
//! - **`protocol`** – The envelope a remote emulator peer exchanges with the
//!   emulator server, its binary encoding, and the length-prefixed framing
//!   used on byte streams.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `vhal_core::PropertyValue` instead of `vhal_core::domain::property::PropertyValue`.
pub use domain::config::{AreaConfig, AreaRange, ChangeMode, PropertyAccess, PropertyConfig};
pub use domain::property::{PropertyPayload, PropertyStatus, PropertyType, PropertyValue, AREA_GLOBAL};
pub use domain::request::{
    GetValueRequest, GetValueResult, SetValueRequest, SetValueResult, StatusCode,
};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{EmulatorMessage, MessageType, ResponseStatus};
