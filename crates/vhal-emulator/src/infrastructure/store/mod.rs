//! In-memory [`PropertyStore`] implementation.
//!
//! Configurations are fixed at construction; values live behind an `RwLock`
//! keyed by `(prop_id, area_id)`. Every area of every configured property
//! holds a value from the start, zero-initialised from the property's type
//! and then overwritten by any seed values.

pub mod defaults;

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, warn};
use vhal_core::{PropertyConfig, PropertyPayload, PropertyValue};

use crate::application::property_store::{PropertyStore, StoreError};

type ValueKey = (i32, i32);

/// Thread-safe in-memory property store.
pub struct InMemoryPropertyStore {
    configs: HashMap<i32, PropertyConfig>,
    values: RwLock<BTreeMap<ValueKey, PropertyValue>>,
}

impl InMemoryPropertyStore {
    /// Creates a store over `configs` with every area holding its zero value.
    pub fn new(configs: impl IntoIterator<Item = PropertyConfig>) -> Self {
        let configs: HashMap<i32, PropertyConfig> =
            configs.into_iter().map(|c| (c.prop_id, c)).collect();

        let mut values = BTreeMap::new();
        for config in configs.values() {
            // Properties with an unknown type field start without a value.
            let Some(ty) = vhal_core::PropertyType::of(config.prop_id) else {
                continue;
            };
            for area_id in config.area_ids() {
                values.insert(
                    (config.prop_id, area_id),
                    PropertyValue::new(config.prop_id, area_id, PropertyPayload::zero_for(ty)),
                );
            }
        }

        Self {
            configs,
            values: RwLock::new(values),
        }
    }

    /// Creates a store holding the built-in vehicle catalogue and its
    /// initial values.
    pub fn with_defaults() -> Self {
        let store = Self::new(defaults::default_configs());
        store.seed(defaults::default_values());
        store
    }

    /// Writes each of `values`, logging and skipping any the store rejects.
    ///
    /// Returns the number of values accepted.
    pub fn seed(&self, values: impl IntoIterator<Item = PropertyValue>) -> usize {
        let mut accepted = 0;
        for value in values {
            let prop_id = value.prop_id;
            match self.write_one(value) {
                Ok(()) => accepted += 1,
                Err(e) => warn!("ignoring seed value for {prop_id:#010x}: {e}"),
            }
        }
        debug!("seeded {accepted} values");
        accepted
    }

    fn validate(&self, value: &PropertyValue) -> Result<(), StoreError> {
        let config = self.configs.get(&value.prop_id).ok_or(StoreError::NotFound {
            prop_id: value.prop_id,
            area_id: value.area_id,
        })?;

        if !config.supports_area(value.area_id) {
            return Err(StoreError::InvalidArea {
                prop_id: value.prop_id,
                area_id: value.area_id,
            });
        }

        if let Some(ty) = value.property_type() {
            if !value.payload.matches(ty) {
                return Err(StoreError::TypeMismatch {
                    prop_id: value.prop_id,
                    kind: value.payload.kind(),
                });
            }
        }

        let range = config.area_config(value.area_id).and_then(|a| a.range);
        if let Some(range) = range {
            if !range.contains(&value.payload) {
                return Err(StoreError::OutOfRange {
                    prop_id: value.prop_id,
                    area_id: value.area_id,
                });
            }
        }
        Ok(())
    }
}

impl PropertyStore for InMemoryPropertyStore {
    fn read_all(&self) -> Vec<PropertyValue> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.values().cloned().collect()
    }

    fn read_one(&self, prop_id: i32, area_id: i32) -> Result<PropertyValue, StoreError> {
        let config = self
            .configs
            .get(&prop_id)
            .ok_or(StoreError::NotFound { prop_id, area_id })?;
        if !config.supports_area(area_id) {
            return Err(StoreError::InvalidArea { prop_id, area_id });
        }

        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values
            .get(&(prop_id, area_id))
            .cloned()
            .ok_or(StoreError::NotAvailable { prop_id })
    }

    fn get_config(&self, prop_id: i32) -> Option<PropertyConfig> {
        self.configs.get(&prop_id).cloned()
    }

    fn get_all_configs(&self) -> Vec<PropertyConfig> {
        let mut configs: Vec<PropertyConfig> = self.configs.values().cloned().collect();
        configs.sort_by_key(|c| c.prop_id);
        configs
    }

    fn write_one(&self, value: PropertyValue) -> Result<(), StoreError> {
        self.validate(&value)?;
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert((value.prop_id, value.area_id), value);
        Ok(())
    }
}
