//! The property store seam.
//!
//! The store is the single shared mutable resource of the emulator: every
//! write path (HAL client, protocol `SetProperty`, vehicle bus) ends in
//! [`PropertyStore::write_one`]. Implementations synchronize internally; the
//! callers in this crate add no locking of their own around store calls.

use thiserror::Error;
use vhal_core::{PropertyConfig, PropertyValue};

/// Why the store refused a read or write.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("property {prop_id:#010x} area {area_id} not found")]
    NotFound { prop_id: i32, area_id: i32 },

    #[error("property {prop_id:#010x} has no area {area_id}")]
    InvalidArea { prop_id: i32, area_id: i32 },

    #[error("property {prop_id:#010x} cannot hold a {kind} payload")]
    TypeMismatch { prop_id: i32, kind: &'static str },

    #[error("value for property {prop_id:#010x} area {area_id} is out of range")]
    OutOfRange { prop_id: i32, area_id: i32 },

    #[error("property {prop_id:#010x} is not available")]
    NotAvailable { prop_id: i32 },

    #[error("access to property {prop_id:#010x} denied")]
    AccessDenied { prop_id: i32 },

    #[error("store failure: {0}")]
    Internal(String),
}

/// Typed key/value store keyed by `(prop_id, area_id)`.
///
/// All values cross this boundary as owned copies.
#[cfg_attr(test, mockall::automock)]
pub trait PropertyStore: Send + Sync {
    /// Returns every current value.
    fn read_all(&self) -> Vec<PropertyValue>;

    /// Returns the current value of one property area.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the property or area is unknown or has no value.
    fn read_one(&self, prop_id: i32, area_id: i32) -> Result<PropertyValue, StoreError>;

    /// Returns the configuration of `prop_id`, if the property exists.
    fn get_config(&self, prop_id: i32) -> Option<PropertyConfig>;

    /// Returns every property configuration.
    fn get_all_configs(&self) -> Vec<PropertyConfig>;

    /// Stores `value`, replacing the current value of its property area.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value is rejected.
    fn write_one(&self, value: PropertyValue) -> Result<(), StoreError>;
}
