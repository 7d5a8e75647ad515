//! Emulator protocol message types.
//!
//! Every exchange on a transport channel is one [`EmulatorMessage`] envelope.
//! Commands come in from the remote peer and each gets exactly one response;
//! `SetPropertyAsync` is the only unsolicited outbound kind.

use crate::domain::config::PropertyConfig;
use crate::domain::property::{PropertyValue, AREA_GLOBAL};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of the fixed envelope header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Header flag: the envelope carries a debug result string.
pub const FLAG_HAS_DEBUG_RESULT: u8 = 1 << 0;

// ── Message type codes ────────────────────────────────────────────────────────

/// Message kinds. Commands have even codes below 12 and are answered by the
/// code that follows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    GetConfigCmd,
    GetConfigResp,
    GetConfigAllCmd,
    GetConfigAllResp,
    GetPropertyCmd,
    GetPropertyResp,
    GetPropertyAllCmd,
    GetPropertyAllResp,
    SetPropertyCmd,
    SetPropertyResp,
    SetPropertyAsync,
    DebugCmd,
    DebugResp,
    /// A code this implementation does not know. Kept so the peer can be
    /// answered instead of dropped.
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            0 => MessageType::GetConfigCmd,
            1 => MessageType::GetConfigResp,
            2 => MessageType::GetConfigAllCmd,
            3 => MessageType::GetConfigAllResp,
            4 => MessageType::GetPropertyCmd,
            5 => MessageType::GetPropertyResp,
            6 => MessageType::GetPropertyAllCmd,
            7 => MessageType::GetPropertyAllResp,
            8 => MessageType::SetPropertyCmd,
            9 => MessageType::SetPropertyResp,
            10 => MessageType::SetPropertyAsync,
            11 => MessageType::DebugCmd,
            12 => MessageType::DebugResp,
            other => MessageType::Other(other),
        }
    }
}

impl MessageType {
    /// Wire code of this kind.
    pub fn code(self) -> u8 {
        match self {
            MessageType::GetConfigCmd => 0,
            MessageType::GetConfigResp => 1,
            MessageType::GetConfigAllCmd => 2,
            MessageType::GetConfigAllResp => 3,
            MessageType::GetPropertyCmd => 4,
            MessageType::GetPropertyResp => 5,
            MessageType::GetPropertyAllCmd => 6,
            MessageType::GetPropertyAllResp => 7,
            MessageType::SetPropertyCmd => 8,
            MessageType::SetPropertyResp => 9,
            MessageType::SetPropertyAsync => 10,
            MessageType::DebugCmd => 11,
            MessageType::DebugResp => 12,
            MessageType::Other(code) => code,
        }
    }

    /// The kind used to answer a message of this kind.
    ///
    /// Non-command kinds are answered with their own kind.
    pub fn response_type(self) -> MessageType {
        match self {
            MessageType::GetConfigCmd => MessageType::GetConfigResp,
            MessageType::GetConfigAllCmd => MessageType::GetConfigAllResp,
            MessageType::GetPropertyCmd => MessageType::GetPropertyResp,
            MessageType::GetPropertyAllCmd => MessageType::GetPropertyAllResp,
            MessageType::SetPropertyCmd => MessageType::SetPropertyResp,
            MessageType::DebugCmd => MessageType::DebugResp,
            other => other,
        }
    }
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Other(0xFF)
    }
}

// ── Status codes ──────────────────────────────────────────────────────────────

/// Status carried by every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ResponseStatus {
    #[default]
    Ok = 0,
    Unknown = 1,
    UnimplementedCommand = 2,
    InvalidProperty = 3,
    InvalidAreaId = 4,
    PropertyUninitialized = 5,
    WriteOnlyProperty = 6,
    MemoryAllocFailed = 7,
    InvalidOperation = 8,
}

impl TryFrom<u8> for ResponseStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(ResponseStatus::Ok),
            1 => Ok(ResponseStatus::Unknown),
            2 => Ok(ResponseStatus::UnimplementedCommand),
            3 => Ok(ResponseStatus::InvalidProperty),
            4 => Ok(ResponseStatus::InvalidAreaId),
            5 => Ok(ResponseStatus::PropertyUninitialized),
            6 => Ok(ResponseStatus::WriteOnlyProperty),
            7 => Ok(ResponseStatus::MemoryAllocFailed),
            8 => Ok(ResponseStatus::InvalidOperation),
            _ => Err(()),
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Property lookup carried by `GetConfigCmd` and `GetPropertyCmd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetRequest {
    pub prop_id: i32,
    /// Absent means the global area.
    pub area_id: Option<i32>,
}

impl GetRequest {
    pub fn new(prop_id: i32) -> Self {
        Self { prop_id, area_id: None }
    }

    pub fn for_area(prop_id: i32, area_id: i32) -> Self {
        Self {
            prop_id,
            area_id: Some(area_id),
        }
    }

    pub fn area_or_global(&self) -> i32 {
        self.area_id.unwrap_or(AREA_GLOBAL)
    }
}

/// One protocol message in either direction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmulatorMessage {
    pub message_type: MessageType,
    pub status: ResponseStatus,
    pub values: Vec<PropertyValue>,
    pub configs: Vec<PropertyConfig>,
    pub get_requests: Vec<GetRequest>,
    pub debug_commands: Vec<String>,
    pub debug_result: Option<String>,
}

impl EmulatorMessage {
    /// Creates an empty message of `message_type` with status OK.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            ..Default::default()
        }
    }

    /// Creates an empty response to a message of `request_type`.
    pub fn response_to(request_type: MessageType) -> Self {
        Self::new(request_type.response_type())
    }

    /// Builds the unsolicited change notification for `value`.
    pub fn set_property_async(value: PropertyValue) -> Self {
        Self {
            values: vec![value],
            ..Self::new(MessageType::SetPropertyAsync)
        }
    }

    /// Builds a `GetPropertyCmd` for one property/area.
    pub fn get_property(prop_id: i32, area_id: i32) -> Self {
        Self {
            get_requests: vec![GetRequest::for_area(prop_id, area_id)],
            ..Self::new(MessageType::GetPropertyCmd)
        }
    }

    /// Builds a `GetConfigCmd` for one property.
    pub fn get_config(prop_id: i32) -> Self {
        Self {
            get_requests: vec![GetRequest::new(prop_id)],
            ..Self::new(MessageType::GetConfigCmd)
        }
    }

    /// Builds a `SetPropertyCmd` carrying `value`.
    pub fn set_property(value: PropertyValue) -> Self {
        Self {
            values: vec![value],
            ..Self::new(MessageType::SetPropertyCmd)
        }
    }

    pub fn with_status(mut self, status: ResponseStatus) -> Self {
        self.status = status;
        self
    }
}
