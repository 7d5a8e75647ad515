//! In-process vehicle bus.
//!
//! Stands in for the real vehicle bus: anything holding the bus can publish
//! property updates, and every registered callback receives them on the
//! publishing thread.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;
use vhal_core::PropertyValue;

use crate::application::hardware_gateway::{BusCallback, VehicleBusListener};

/// [`VehicleBusListener`] that fans published values out to its subscribers.
#[derive(Default)]
pub struct InProcessBus {
    next_handle: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, BusCallback>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `value` to every subscriber. Returns how many received it.
    pub fn publish(&self, value: PropertyValue) -> usize {
        // Callbacks run without the lock held so they may unregister.
        let callbacks: Vec<BusCallback> = self.subscribers().values().cloned().collect();
        trace!(
            "bus update {:#010x} to {} subscriber(s)",
            value.prop_id,
            callbacks.len()
        );
        for callback in &callbacks {
            callback(value.clone());
        }
        callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn subscribers(&self) -> MutexGuard<'_, BTreeMap<u64, BusCallback>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VehicleBusListener for InProcessBus {
    fn register(&self, callback: BusCallback) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.subscribers().insert(handle, callback);
        handle
    }

    fn unregister(&self, handle: u64) {
        self.subscribers().remove(&handle);
    }
}
