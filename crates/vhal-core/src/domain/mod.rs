//! Vehicle property domain model.
//!
//! Pure data types with no I/O: what a property value looks like, how a
//! property is configured, and the request/result pairs the HAL client
//! exchanges with the gateway.

pub mod config;
pub mod property;
pub mod request;
