//! Application layer of the emulator.
//!
//! Use cases here depend on the [`property_store::PropertyStore`] seam and the
//! transport channel traits, never on a concrete store or socket.
//!
//! # Sub-modules
//!
//! - **`hardware_gateway`** – Entry point for the HAL client: batched writes
//!   and reads, the vehicle-side write path, and ownership of the protocol
//!   server.
//!
//! - **`protocol_server`** – Decodes emulator protocol envelopes, answers them
//!   from the store, and broadcasts property changes to every channel.
//!
//! - **`property_store`** – The store trait and its error type.
//!
//! - **`write_policy`** – Runtime mode and the writes suppressed in it.
//!
//! - **`debug_dump`** – Text dump behind the protocol `Debug` command.

pub mod debug_dump;
pub mod hardware_gateway;
pub mod property_store;
pub mod protocol_server;
pub mod write_policy;
