//! Emulator protocol server.
//!
//! Answers commands from remote emulator peers and pushes property changes to
//! them. Every inbound envelope is handled independently:
//!
//! ```text
//! Received → Decoded → Dispatched(message type) → store access → reply on the same channel
//! ```
//!
//! The server never holds state between messages. Writes requested by a peer
//! (`SetPropertyCmd`) take the gateway's vehicle-side path, which updates the
//! store and notifies the HAL client but does not echo the change back to the
//! channels.

use std::sync::{Arc, Weak};

use tracing::{debug, error, info, warn};
use vhal_core::protocol::peek_message_type;
use vhal_core::{decode_message, EmulatorMessage, MessageType, PropertyValue, ResponseStatus};

use super::debug_dump::DebugHook;
use super::hardware_gateway::VehicleWriter;
use super::property_store::PropertyStore;
use crate::infrastructure::channel::{ChannelError, ChannelSet, InboundHandler};

/// Decodes, dispatches and answers emulator protocol messages.
pub struct ProtocolServer {
    store: Arc<dyn PropertyStore>,
    channels: ChannelSet,
    vehicle: Weak<dyn VehicleWriter>,
    debug_hook: Arc<dyn DebugHook>,
}

impl ProtocolServer {
    /// Creates a server over `channels`. Channels are not started until
    /// [`ProtocolServer::start_channels`] is called.
    pub fn new(
        store: Arc<dyn PropertyStore>,
        channels: ChannelSet,
        vehicle: Weak<dyn VehicleWriter>,
        debug_hook: Arc<dyn DebugHook>,
    ) -> Self {
        Self {
            store,
            channels,
            vehicle,
            debug_hook,
        }
    }

    // ── Channel lifecycle ─────────────────────────────────────────────────────

    /// Starts every channel with this server as its inbound handler.
    ///
    /// # Errors
    ///
    /// Returns the first [`ChannelError`]; channels started before the
    /// failure stay running until [`ProtocolServer::stop_channels`].
    pub fn start_channels(self: &Arc<Self>) -> Result<(), ChannelError> {
        for channel in self.channels.iter() {
            let handler: Arc<dyn InboundHandler> = Arc::clone(self) as Arc<dyn InboundHandler>;
            channel.start(handler).map_err(|e| {
                error!("failed to start {} channel: {e}", channel.name());
                e
            })?;
            info!("{} channel started", channel.name());
        }
        Ok(())
    }

    /// Stops every channel, in reverse start order.
    pub fn stop_channels(&self) {
        for channel in self.channels.iter().rev() {
            channel.stop();
            info!("{} channel stopped", channel.name());
        }
    }

    // ── Broadcast ─────────────────────────────────────────────────────────────

    /// Sends a `SetPropertyAsync` carrying `value` on every channel.
    ///
    /// A failing channel is logged and skipped; the others still receive the
    /// message. Returns the number of channels that accepted it.
    pub fn broadcast(&self, value: &PropertyValue) -> usize {
        let message = EmulatorMessage::set_property_async(value.clone());
        let mut delivered = 0;
        for channel in self.channels.iter() {
            match channel.send(&message) {
                Ok(()) => delivered += 1,
                Err(e) => error!(
                    "broadcast of property {:#010x} on {} channel failed: {e}",
                    value.prop_id,
                    channel.name()
                ),
            }
        }
        delivered
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Decodes one envelope and returns the reply.
    ///
    /// An envelope that cannot be decoded is answered with `InvalidOperation`,
    /// using the message type from its header when that much is readable.
    pub fn handle_envelope(&self, envelope: &[u8]) -> EmulatorMessage {
        match decode_message(envelope) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                warn!("undecodable envelope ({} bytes): {e}", envelope.len());
                let kind = peek_message_type(envelope).unwrap_or_default();
                EmulatorMessage::response_to(kind).with_status(ResponseStatus::InvalidOperation)
            }
        }
    }

    /// Dispatches one decoded message and returns the reply.
    pub fn handle_message(&self, message: EmulatorMessage) -> EmulatorMessage {
        debug!(
            "inbound {:?}: {} values, {} gets, {} debug args",
            message.message_type,
            message.values.len(),
            message.get_requests.len(),
            message.debug_commands.len()
        );

        let reply = EmulatorMessage::response_to(message.message_type);
        match message.message_type {
            MessageType::GetConfigCmd => self.get_config(&message, reply),
            MessageType::GetConfigAllCmd => self.get_config_all(reply),
            MessageType::GetPropertyCmd => self.get_property(&message, reply),
            MessageType::GetPropertyAllCmd => self.get_property_all(reply),
            MessageType::SetPropertyCmd => self.set_property(message, reply),
            MessageType::DebugCmd => self.debug(&message, reply),
            other => {
                warn!("unimplemented message type {other:?}");
                reply.with_status(ResponseStatus::UnimplementedCommand)
            }
        }
    }

    fn get_config(&self, message: &EmulatorMessage, mut reply: EmulatorMessage) -> EmulatorMessage {
        let Some(request) = message.get_requests.first() else {
            return reply.with_status(ResponseStatus::InvalidOperation);
        };
        match self.store.get_config(request.prop_id) {
            Some(config) => {
                reply.configs.push(config);
                reply
            }
            None => reply.with_status(ResponseStatus::InvalidProperty),
        }
    }

    fn get_config_all(&self, mut reply: EmulatorMessage) -> EmulatorMessage {
        reply.configs = self.store.get_all_configs();
        reply
    }

    fn get_property(&self, message: &EmulatorMessage, mut reply: EmulatorMessage) -> EmulatorMessage {
        let Some(request) = message.get_requests.first() else {
            return reply.with_status(ResponseStatus::InvalidOperation);
        };
        match self.store.read_one(request.prop_id, request.area_or_global()) {
            Ok(value) => {
                reply.values.push(value);
                reply
            }
            Err(e) => {
                debug!("get property failed: {e}");
                reply.with_status(ResponseStatus::InvalidProperty)
            }
        }
    }

    fn get_property_all(&self, mut reply: EmulatorMessage) -> EmulatorMessage {
        reply.values = self.store.read_all();
        reply
    }

    fn set_property(&self, message: EmulatorMessage, reply: EmulatorMessage) -> EmulatorMessage {
        let Some(mut value) = message.values.into_iter().next() else {
            return reply.with_status(ResponseStatus::InvalidOperation);
        };
        value.refresh_timestamp();

        let Some(vehicle) = self.vehicle.upgrade() else {
            warn!("set property {:#010x} after gateway shutdown", value.prop_id);
            return reply.with_status(ResponseStatus::InvalidProperty);
        };
        match vehicle.set_property_from_vehicle(value) {
            Ok(()) => reply,
            Err(e) => {
                warn!("emulator set property rejected: {e}");
                reply.with_status(ResponseStatus::InvalidProperty)
            }
        }
    }

    fn debug(&self, message: &EmulatorMessage, mut reply: EmulatorMessage) -> EmulatorMessage {
        reply.debug_result = Some(self.debug_hook.dump(&message.debug_commands));
        reply
    }
}

impl InboundHandler for ProtocolServer {
    fn on_envelope(&self, envelope: &[u8]) -> EmulatorMessage {
        self.handle_envelope(envelope)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
