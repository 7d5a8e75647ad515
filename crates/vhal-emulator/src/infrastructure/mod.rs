//! Infrastructure layer of the emulator.
//!
//! Contains the concrete adapters: transport channels, the in-memory property
//! store, the in-process vehicle bus and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and `vhal_core`,
//! but MUST NOT be imported by the domain layer.

pub mod bus;
pub mod channel;
pub mod storage;
pub mod store;
