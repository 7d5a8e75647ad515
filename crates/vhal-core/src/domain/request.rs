//! Batched get/set requests exchanged with the HAL client.

use super::property::PropertyValue;

/// Result status reported to the HAL client for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    TryAgain = 1,
    InvalidArg = 2,
    NotAvailable = 3,
    AccessDenied = 4,
    InternalError = 5,
}

/// One write in a `set_values` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SetValueRequest {
    /// Caller-supplied correlation token, echoed in the matching result.
    pub request_id: i64,
    pub value: PropertyValue,
}

/// Outcome of one [`SetValueRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetValueResult {
    pub request_id: i64,
    pub status: StatusCode,
}

/// One read in a `get_values` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetValueRequest {
    pub request_id: i64,
    pub prop_id: i32,
    pub area_id: i32,
}

/// Outcome of one [`GetValueRequest`]; `value` is present only when `status` is OK.
#[derive(Debug, Clone, PartialEq)]
pub struct GetValueResult {
    pub request_id: i64,
    pub status: StatusCode,
    pub value: Option<PropertyValue>,
}
