//! Hardware gateway: the HAL client's entry point into the emulated vehicle.
//!
//! Every write the HAL client issues goes through [`HardwareGateway::set_values`]:
//!
//! 1. Requests to properties suppressed by the [`WritePolicy`] succeed without
//!    touching the store.
//! 2. Everything else is checked against the property's access mode and
//!    written to the [`PropertyStore`].
//! 3. A successful write is announced to every emulator channel as a
//!    `SetPropertyAsync` broadcast.
//!
//! Writes that originate on the vehicle side (the vehicle bus listener and the
//! protocol `SetProperty` command) take a second path that skips the access
//! check and reports the change to the HAL client's [`PropertyEventSink`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use thiserror::Error;
use tracing::{debug, info, warn};
use vhal_core::{
    GetValueRequest, GetValueResult, PropertyConfig, PropertyValue, SetValueRequest,
    SetValueResult, StatusCode,
};

use super::debug_dump::DebugHook;
use super::property_store::{PropertyStore, StoreError};
use super::protocol_server::ProtocolServer;
use super::write_policy::WritePolicy;
use crate::infrastructure::channel::{ChannelError, ChannelSet};

/// Receives the results of one `set_values` call. Invoked exactly once.
pub type SetValuesCallback = Box<dyn FnOnce(Vec<SetValueResult>) + Send>;

/// Receives the results of one `get_values` call. Invoked exactly once.
pub type GetValuesCallback = Box<dyn FnOnce(Vec<GetValueResult>) + Send>;

/// Callback a [`VehicleBusListener`] invokes for every update it delivers.
pub type BusCallback = Arc<dyn Fn(PropertyValue) + Send + Sync>;

/// Error type for calls the gateway rejects outright.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Two requests in one batch share a request id.
    #[error("duplicate request id {0} in batch")]
    DuplicateRequestId(i64),

    #[error("property {0:#010x} not found")]
    PropertyNotFound(i32),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// HAL-client side receiver of property changes made on the vehicle side.
pub trait PropertyEventSink: Send + Sync {
    fn on_property_event(&self, values: &[PropertyValue]);
}

/// Source of externally produced property updates.
pub trait VehicleBusListener: Send + Sync {
    /// Registers `callback` and returns a handle for [`VehicleBusListener::unregister`].
    fn register(&self, callback: BusCallback) -> u64;

    fn unregister(&self, handle: u64);
}

/// Vehicle-side write path.
///
/// The protocol server holds a weak reference to the gateway through this
/// trait so that `SetProperty` commands reach the store the same way
/// vehicle-bus updates do.
pub trait VehicleWriter: Send + Sync {
    /// Writes `value` to the store and notifies the HAL client.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] if the store rejects the value.
    fn set_property_from_vehicle(&self, value: PropertyValue) -> Result<(), StoreError>;
}

/// The hardware gateway.
///
/// Owns the [`ProtocolServer`] and, through it, every transport channel.
/// Channels are started by [`HardwareGateway::new`] and stopped in reverse
/// order when the gateway is dropped.
pub struct HardwareGateway {
    store: Arc<dyn PropertyStore>,
    policy: WritePolicy,
    server: Arc<ProtocolServer>,
    event_sink: RwLock<Option<Arc<dyn PropertyEventSink>>>,
    listener: Mutex<Option<(Arc<dyn VehicleBusListener>, u64)>>,
}

impl HardwareGateway {
    /// Builds the gateway and its protocol server, then starts every channel.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Channel`] if a channel fails to start. Channels
    /// that did start are stopped again before returning.
    pub fn new(
        store: Arc<dyn PropertyStore>,
        channels: ChannelSet,
        policy: WritePolicy,
        debug_hook: Arc<dyn DebugHook>,
    ) -> Result<Arc<Self>, GatewayError> {
        info!(
            "hardware gateway starting in {} mode with {} channel(s)",
            policy.mode(),
            channels.len()
        );

        let gateway = Arc::new_cyclic(|weak: &Weak<Self>| {
            let vehicle: Weak<dyn VehicleWriter> = weak.clone();
            let server = Arc::new(ProtocolServer::new(
                Arc::clone(&store),
                channels,
                vehicle,
                debug_hook,
            ));
            Self {
                store,
                policy,
                server,
                event_sink: RwLock::new(None),
                listener: Mutex::new(None),
            }
        });

        // On failure, dropping `gateway` stops whatever did start.
        gateway.server.start_channels()?;
        Ok(gateway)
    }

    // ── HAL client writes ─────────────────────────────────────────────────────

    /// Applies a batch of writes and reports one result per request through
    /// `callback`.
    ///
    /// The callback runs on the calling thread before this method returns.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateRequestId`] if two requests share an
    /// id; nothing is written and the callback is not invoked.
    pub fn set_values(
        &self,
        requests: Vec<SetValueRequest>,
        callback: SetValuesCallback,
    ) -> Result<(), GatewayError> {
        check_unique(requests.iter().map(|r| r.request_id))?;

        let results = requests
            .into_iter()
            .map(|request| SetValueResult {
                request_id: request.request_id,
                status: self.set_one(request.value),
            })
            .collect();
        callback(results);
        Ok(())
    }

    fn set_one(&self, value: PropertyValue) -> StatusCode {
        if self.policy.suppresses(value.prop_id) {
            debug!(
                "write to property {:#010x} suppressed in {} mode",
                value.prop_id,
                self.policy.mode()
            );
            return StatusCode::Ok;
        }

        match self.store.get_config(value.prop_id) {
            None => {
                warn!("write to unknown property {:#010x}", value.prop_id);
                return StatusCode::InvalidArg;
            }
            Some(config) if !config.access.can_write() => {
                warn!("write to read-only property {:#010x}", value.prop_id);
                return StatusCode::AccessDenied;
            }
            Some(_) => {}
        }

        match self.store.write_one(value.clone()) {
            Ok(()) => {
                self.server.broadcast(&value);
                StatusCode::Ok
            }
            Err(e) => {
                warn!("store rejected write: {e}");
                status_for(&e)
            }
        }
    }

    // ── HAL client reads ──────────────────────────────────────────────────────

    /// Reads a batch of property areas and reports one result per request
    /// through `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateRequestId`] if two requests share an id.
    pub fn get_values(
        &self,
        requests: Vec<GetValueRequest>,
        callback: GetValuesCallback,
    ) -> Result<(), GatewayError> {
        check_unique(requests.iter().map(|r| r.request_id))?;

        let results = requests.iter().map(|request| self.get_one(request)).collect();
        callback(results);
        Ok(())
    }

    fn get_one(&self, request: &GetValueRequest) -> GetValueResult {
        let failed = |status| GetValueResult {
            request_id: request.request_id,
            status,
            value: None,
        };

        match self.store.get_config(request.prop_id) {
            None => return failed(StatusCode::InvalidArg),
            Some(config) if !config.access.can_read() => return failed(StatusCode::AccessDenied),
            Some(_) => {}
        }

        match self.store.read_one(request.prop_id, request.area_id) {
            Ok(value) => GetValueResult {
                request_id: request.request_id,
                status: StatusCode::Ok,
                value: Some(value),
            },
            Err(e) => {
                debug!("read failed: {e}");
                failed(status_for(&e))
            }
        }
    }

    /// Returns every current value.
    pub fn get_all_properties(&self) -> Vec<PropertyValue> {
        self.store.read_all()
    }

    /// Returns the configuration of `prop_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PropertyNotFound`] for an unknown property.
    pub fn get_property_config(&self, prop_id: i32) -> Result<PropertyConfig, GatewayError> {
        self.store
            .get_config(prop_id)
            .ok_or(GatewayError::PropertyNotFound(prop_id))
    }

    pub fn get_all_property_configs(&self) -> Vec<PropertyConfig> {
        self.store.get_all_configs()
    }

    // ── Vehicle side ──────────────────────────────────────────────────────────

    /// Installs the HAL client's event sink, replacing any previous one.
    pub fn set_event_sink(&self, sink: Arc<dyn PropertyEventSink>) {
        *self
            .event_sink
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Handles one update delivered by the vehicle bus: write, notify the
    /// HAL client, broadcast to every channel.
    pub fn on_bus_update(&self, value: PropertyValue) {
        match self.set_property_from_vehicle(value.clone()) {
            Ok(()) => {
                self.server.broadcast(&value);
            }
            Err(e) => warn!("dropping vehicle bus update: {e}"),
        }
    }

    /// Subscribes to `listener`. Updates are delivered to
    /// [`HardwareGateway::on_bus_update`] until the gateway is dropped.
    ///
    /// A previously attached listener is unregistered first.
    pub fn attach_listener(self: &Arc<Self>, listener: Arc<dyn VehicleBusListener>) {
        let weak = Arc::downgrade(self);
        let handle = listener.register(Arc::new(move |value: PropertyValue| {
            if let Some(gateway) = weak.upgrade() {
                gateway.on_bus_update(value);
            }
        }));
        info!("attached to vehicle bus listener (handle {handle})");

        if let Some((old, old_handle)) = lock(&self.listener).replace((listener, handle)) {
            old.unregister(old_handle);
        }
    }

    fn emit(&self, value: &PropertyValue) {
        let sink = self
            .event_sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink.on_property_event(std::slice::from_ref(value));
        }
    }
}

impl VehicleWriter for HardwareGateway {
    fn set_property_from_vehicle(&self, value: PropertyValue) -> Result<(), StoreError> {
        self.store.write_one(value.clone())?;
        self.emit(&value);
        Ok(())
    }
}

impl Drop for HardwareGateway {
    fn drop(&mut self) {
        if let Some((listener, handle)) = lock(&self.listener).take() {
            listener.unregister(handle);
        }
        self.server.stop_channels();
        info!("hardware gateway stopped");
    }
}

/// Maps a store rejection to the status reported to the HAL client.
pub fn status_for(error: &StoreError) -> StatusCode {
    match error {
        StoreError::NotFound { .. }
        | StoreError::InvalidArea { .. }
        | StoreError::TypeMismatch { .. }
        | StoreError::OutOfRange { .. } => StatusCode::InvalidArg,
        StoreError::NotAvailable { .. } => StatusCode::NotAvailable,
        StoreError::AccessDenied { .. } => StatusCode::AccessDenied,
        StoreError::Internal(_) => StatusCode::InternalError,
    }
}

fn check_unique(ids: impl Iterator<Item = i64>) -> Result<(), GatewayError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(GatewayError::DuplicateRequestId(id));
        }
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
