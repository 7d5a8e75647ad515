//! Binary codec for emulator protocol envelopes.
//!
//! Wire format of one envelope (framing is added by the transport channel):
//! ```text
//! [version:1][msg_type:1][status:1][flags:1]
//! [n_values:2]   n × value
//! [n_configs:2]  n × config
//! [n_gets:2]     n × get request
//! [n_debug:2]    n × string
//! [debug_result: string]        only when flags & FLAG_HAS_DEBUG_RESULT
//! ```
//! All multi-byte integers are big-endian. Strings and byte vectors carry a
//! 4-byte length prefix; floats travel as their IEEE-754 bit patterns.

use thiserror::Error;

use crate::domain::config::{AreaConfig, AreaRange, ChangeMode, PropertyAccess, PropertyConfig};
use crate::domain::property::{PropertyPayload, PropertyStatus, PropertyValue};
use crate::protocol::messages::{
    EmulatorMessage, GetRequest, MessageType, ResponseStatus, FLAG_HAS_DEBUG_RESULT, HEADER_SIZE,
    PROTOCOL_VERSION,
};

/// Errors that can occur during envelope encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice ended before a field could be read.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// A field value is out of range (unknown tag, status, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A section holds more entries than its count field can describe.
    #[error("too many entries in {section}: {count}")]
    TooManyEntries { section: &'static str, count: usize },

    /// Bytes remained after the last section.
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),
}

// Payload kind tags.
const TAG_INT32: u8 = 0x01;
const TAG_INT64: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_BYTES: u8 = 0x04;
const TAG_STRING: u8 = 0x05;

// Area range tags.
const RANGE_NONE: u8 = 0x00;
const RANGE_INT32: u8 = 0x01;
const RANGE_INT64: u8 = 0x02;
const RANGE_FLOAT: u8 = 0x03;

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`EmulatorMessage`] into a byte vector.
///
/// # Errors
///
/// Returns [`ProtocolError::TooManyEntries`] if a section or string is too
/// long for its length field.
///
/// # Examples
///
/// ```rust
/// use vhal_core::protocol::{decode_message, encode_message};
/// use vhal_core::protocol::messages::{EmulatorMessage, MessageType};
///
/// let msg = EmulatorMessage::new(MessageType::GetPropertyAllCmd);
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(decode_message(&bytes).unwrap(), msg);
/// ```
pub fn encode_message(msg: &EmulatorMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 64);

    let flags = if msg.debug_result.is_some() {
        FLAG_HAS_DEBUG_RESULT
    } else {
        0
    };
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type.code());
    buf.push(msg.status as u8);
    buf.push(flags);

    write_count(&mut buf, msg.values.len(), "values")?;
    for value in &msg.values {
        encode_value(&mut buf, value)?;
    }

    write_count(&mut buf, msg.configs.len(), "configs")?;
    for config in &msg.configs {
        encode_config(&mut buf, config)?;
    }

    write_count(&mut buf, msg.get_requests.len(), "get_requests")?;
    for get in &msg.get_requests {
        encode_get_request(&mut buf, get);
    }

    write_count(&mut buf, msg.debug_commands.len(), "debug_commands")?;
    for cmd in &msg.debug_commands {
        write_string(&mut buf, cmd)?;
    }

    if let Some(result) = &msg.debug_result {
        write_string(&mut buf, result)?;
    }

    Ok(buf)
}

/// Decodes one complete [`EmulatorMessage`] from `bytes`.
///
/// Unknown message type codes are not an error: they decode to
/// [`MessageType::Other`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed or not fully consumed.
pub fn decode_message(bytes: &[u8]) -> Result<EmulatorMessage, ProtocolError> {
    let mut r = Reader::new(bytes);

    let version = r.u8()?;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    let message_type = MessageType::from(r.u8()?);
    let status_byte = r.u8()?;
    let status = ResponseStatus::try_from(status_byte)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown status: {status_byte}")))?;
    let flags = r.u8()?;

    let n_values = r.u16()? as usize;
    let mut values = Vec::with_capacity(n_values.min(r.remaining()));
    for _ in 0..n_values {
        values.push(decode_value(&mut r)?);
    }

    let n_configs = r.u16()? as usize;
    let mut configs = Vec::with_capacity(n_configs.min(r.remaining()));
    for _ in 0..n_configs {
        configs.push(decode_config(&mut r)?);
    }

    let n_gets = r.u16()? as usize;
    let mut get_requests = Vec::with_capacity(n_gets.min(r.remaining()));
    for _ in 0..n_gets {
        get_requests.push(decode_get_request(&mut r)?);
    }

    let n_debug = r.u16()? as usize;
    let mut debug_commands = Vec::with_capacity(n_debug.min(r.remaining()));
    for _ in 0..n_debug {
        debug_commands.push(r.string()?);
    }

    let debug_result = if flags & FLAG_HAS_DEBUG_RESULT != 0 {
        Some(r.string()?)
    } else {
        None
    };

    if r.remaining() > 0 {
        return Err(ProtocolError::TrailingBytes(r.remaining()));
    }

    Ok(EmulatorMessage {
        message_type,
        status,
        values,
        configs,
        get_requests,
        debug_commands,
        debug_result,
    })
}

/// Reads the message type from an envelope header without decoding the body.
///
/// Lets a server answer an undecodable envelope with the right response kind.
pub fn peek_message_type(bytes: &[u8]) -> Option<MessageType> {
    if bytes.len() < 2 {
        return None;
    }
    Some(MessageType::from(bytes[1]))
}

/// Encodes an envelope with a header and four empty sections.
///
/// Unlike [`encode_message`] this cannot fail, so a channel can always
/// answer with it when the real reply does not fit.
pub fn encode_bare(message_type: MessageType, status: ResponseStatus) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 8);
    buf.extend_from_slice(&[PROTOCOL_VERSION, message_type.code(), status as u8, 0]);
    // values, configs, get_requests, debug_commands
    buf.extend_from_slice(&[0u8; 8]);
    buf
}

// ── Per-section encode helpers ────────────────────────────────────────────────

fn encode_value(buf: &mut Vec<u8>, v: &PropertyValue) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&v.prop_id.to_be_bytes());
    buf.extend_from_slice(&v.area_id.to_be_bytes());
    buf.extend_from_slice(&v.timestamp_ns.to_be_bytes());
    buf.push(v.status as u8);
    encode_payload(buf, &v.payload)
}

fn encode_payload(buf: &mut Vec<u8>, payload: &PropertyPayload) -> Result<(), ProtocolError> {
    match payload {
        PropertyPayload::Int32(items) => {
            buf.push(TAG_INT32);
            write_len(buf, items.len(), "int32 values")?;
            for x in items {
                buf.extend_from_slice(&x.to_be_bytes());
            }
        }
        PropertyPayload::Int64(items) => {
            buf.push(TAG_INT64);
            write_len(buf, items.len(), "int64 values")?;
            for x in items {
                buf.extend_from_slice(&x.to_be_bytes());
            }
        }
        PropertyPayload::Float(items) => {
            buf.push(TAG_FLOAT);
            write_len(buf, items.len(), "float values")?;
            for x in items {
                buf.extend_from_slice(&x.to_bits().to_be_bytes());
            }
        }
        PropertyPayload::Bytes(bytes) => {
            buf.push(TAG_BYTES);
            write_len(buf, bytes.len(), "bytes")?;
            buf.extend_from_slice(bytes);
        }
        PropertyPayload::String(s) => {
            buf.push(TAG_STRING);
            write_string(buf, s)?;
        }
    }
    Ok(())
}

fn encode_config(buf: &mut Vec<u8>, c: &PropertyConfig) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&c.prop_id.to_be_bytes());
    buf.push(c.access as u8);
    buf.push(c.change_mode as u8);
    write_len(buf, c.config_array.len(), "config_array")?;
    for x in &c.config_array {
        buf.extend_from_slice(&x.to_be_bytes());
    }
    write_string(buf, &c.config_string)?;
    buf.extend_from_slice(&c.min_sample_rate.to_bits().to_be_bytes());
    buf.extend_from_slice(&c.max_sample_rate.to_bits().to_be_bytes());
    write_count(buf, c.area_configs.len(), "area_configs")?;
    for area in &c.area_configs {
        buf.extend_from_slice(&area.area_id.to_be_bytes());
        match area.range {
            None => buf.push(RANGE_NONE),
            Some(AreaRange::Int32 { min, max }) => {
                buf.push(RANGE_INT32);
                buf.extend_from_slice(&min.to_be_bytes());
                buf.extend_from_slice(&max.to_be_bytes());
            }
            Some(AreaRange::Int64 { min, max }) => {
                buf.push(RANGE_INT64);
                buf.extend_from_slice(&min.to_be_bytes());
                buf.extend_from_slice(&max.to_be_bytes());
            }
            Some(AreaRange::Float { min, max }) => {
                buf.push(RANGE_FLOAT);
                buf.extend_from_slice(&min.to_bits().to_be_bytes());
                buf.extend_from_slice(&max.to_bits().to_be_bytes());
            }
        }
    }
    Ok(())
}

fn encode_get_request(buf: &mut Vec<u8>, g: &GetRequest) {
    buf.extend_from_slice(&g.prop_id.to_be_bytes());
    match g.area_id {
        Some(area) => {
            buf.push(0x01);
            buf.extend_from_slice(&area.to_be_bytes());
        }
        None => {
            buf.push(0x00);
            buf.extend_from_slice(&0i32.to_be_bytes());
        }
    }
}

// ── Per-section decode helpers ────────────────────────────────────────────────

fn decode_value(r: &mut Reader<'_>) -> Result<PropertyValue, ProtocolError> {
    let prop_id = r.i32()?;
    let area_id = r.i32()?;
    let timestamp_ns = r.i64()?;
    let status_byte = r.u8()?;
    let status = PropertyStatus::try_from(status_byte).map_err(|_| {
        ProtocolError::MalformedPayload(format!("unknown property status: {status_byte}"))
    })?;
    let payload = decode_payload(r)?;
    Ok(PropertyValue {
        prop_id,
        area_id,
        timestamp_ns,
        status,
        payload,
    })
}

fn decode_payload(r: &mut Reader<'_>) -> Result<PropertyPayload, ProtocolError> {
    let tag = r.u8()?;
    let payload = match tag {
        TAG_INT32 => {
            let n = r.len_prefix(4)?;
            PropertyPayload::Int32((0..n).map(|_| r.i32()).collect::<Result<_, _>>()?)
        }
        TAG_INT64 => {
            let n = r.len_prefix(8)?;
            PropertyPayload::Int64((0..n).map(|_| r.i64()).collect::<Result<_, _>>()?)
        }
        TAG_FLOAT => {
            let n = r.len_prefix(4)?;
            PropertyPayload::Float((0..n).map(|_| r.f32()).collect::<Result<_, _>>()?)
        }
        TAG_BYTES => {
            let n = r.len_prefix(1)?;
            PropertyPayload::Bytes(r.take(n)?.to_vec())
        }
        TAG_STRING => PropertyPayload::String(r.string()?),
        other => {
            return Err(ProtocolError::MalformedPayload(format!(
                "unknown payload tag: {other}"
            )));
        }
    };
    Ok(payload)
}

fn decode_config(r: &mut Reader<'_>) -> Result<PropertyConfig, ProtocolError> {
    let prop_id = r.i32()?;
    let access_byte = r.u8()?;
    let access = PropertyAccess::try_from(access_byte)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown access: {access_byte}")))?;
    let mode_byte = r.u8()?;
    let change_mode = ChangeMode::try_from(mode_byte)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown change mode: {mode_byte}")))?;
    let n = r.len_prefix(4)?;
    let config_array = (0..n).map(|_| r.i32()).collect::<Result<_, _>>()?;
    let config_string = r.string()?;
    let min_sample_rate = r.f32()?;
    let max_sample_rate = r.f32()?;

    let n_areas = r.u16()? as usize;
    let mut area_configs = Vec::with_capacity(n_areas.min(r.remaining()));
    for _ in 0..n_areas {
        let area_id = r.i32()?;
        let range = match r.u8()? {
            RANGE_NONE => None,
            RANGE_INT32 => Some(AreaRange::Int32 {
                min: r.i32()?,
                max: r.i32()?,
            }),
            RANGE_INT64 => Some(AreaRange::Int64 {
                min: r.i64()?,
                max: r.i64()?,
            }),
            RANGE_FLOAT => Some(AreaRange::Float {
                min: r.f32()?,
                max: r.f32()?,
            }),
            other => {
                return Err(ProtocolError::MalformedPayload(format!(
                    "unknown area range tag: {other}"
                )));
            }
        };
        area_configs.push(AreaConfig { area_id, range });
    }

    Ok(PropertyConfig {
        prop_id,
        access,
        change_mode,
        config_array,
        config_string,
        min_sample_rate,
        max_sample_rate,
        area_configs,
    })
}

fn decode_get_request(r: &mut Reader<'_>) -> Result<GetRequest, ProtocolError> {
    let prop_id = r.i32()?;
    let has_area = r.u8()? != 0;
    let area_id = r.i32()?;
    Ok(GetRequest {
        prop_id,
        area_id: has_area.then_some(area_id),
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

/// Writes a 2-byte section count.
fn write_count(buf: &mut Vec<u8>, count: usize, section: &'static str) -> Result<(), ProtocolError> {
    let n = u16::try_from(count).map_err(|_| ProtocolError::TooManyEntries { section, count })?;
    buf.extend_from_slice(&n.to_be_bytes());
    Ok(())
}

/// Writes a 4-byte element/byte length.
fn write_len(buf: &mut Vec<u8>, len: usize, section: &'static str) -> Result<(), ProtocolError> {
    let n = u32::try_from(len).map_err(|_| ProtocolError::TooManyEntries {
        section,
        count: len,
    })?;
    buf.extend_from_slice(&n.to_be_bytes());
    Ok(())
}

/// Writes a 4-byte length prefix followed by the UTF-8 string bytes.
fn write_string(buf: &mut Vec<u8>, s: &str) -> Result<(), ProtocolError> {
    write_len(buf, s.len(), "string")?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Bounds-checked big-endian cursor over an envelope.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::InsufficientData {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_bits(self.u32()?))
    }

    /// Reads a 4-byte element count and checks that `count × elem_size`
    /// bytes are actually present, so a hostile count cannot force a huge
    /// allocation.
    fn len_prefix(&mut self, elem_size: usize) -> Result<usize, ProtocolError> {
        let n = self.u32()? as usize;
        let needed = n.saturating_mul(elem_size);
        if self.remaining() < needed {
            return Err(ProtocolError::InsufficientData {
                needed: self.pos.saturating_add(needed),
                available: self.buf.len(),
            });
        }
        Ok(n)
    }

    fn string(&mut self) -> Result<String, ProtocolError> {
        let n = self.len_prefix(1)?;
        let bytes = self.take(n)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::property::{ids, seat, AREA_GLOBAL};

    fn round_trip(msg: &EmulatorMessage) -> EmulatorMessage {
        let encoded = encode_message(msg).expect("encode failed");
        decode_message(&encoded).expect("decode failed")
    }

    fn hvac_config() -> PropertyConfig {
        PropertyConfig::new(
            ids::HVAC_TEMPERATURE_SET,
            PropertyAccess::ReadWrite,
            ChangeMode::OnChange,
        )
        .with_areas(vec![
            AreaConfig::with_range(seat::ROW_1_LEFT, AreaRange::Float { min: 16.0, max: 28.0 }),
            AreaConfig::new(seat::ROW_1_RIGHT),
        ])
    }

    // ── Envelopes ─────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_command_round_trip() {
        let msg = EmulatorMessage::new(MessageType::GetConfigAllCmd);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_empty_envelope_is_header_plus_four_counts() {
        let bytes = encode_message(&EmulatorMessage::new(MessageType::GetPropertyAllCmd)).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 4 * 2);
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(bytes[1], 6);
    }

    #[test]
    fn test_get_property_response_with_every_payload_kind_round_trip() {
        let mut msg = EmulatorMessage::response_to(MessageType::GetPropertyAllCmd);
        msg.values = vec![
            PropertyValue::new(ids::GEAR_SELECTION, AREA_GLOBAL, PropertyPayload::Int32(vec![4])),
            PropertyValue::new(0x1151_0001, AREA_GLOBAL, PropertyPayload::Int64(vec![-1, i64::MAX])),
            PropertyValue::new(ids::PERF_VEHICLE_SPEED, AREA_GLOBAL, PropertyPayload::Float(vec![27.5])),
            PropertyValue::new(0x1170_0001, AREA_GLOBAL, PropertyPayload::Bytes(vec![0, 0xFF])),
            PropertyValue::new(ids::INFO_MAKE, AREA_GLOBAL, PropertyPayload::String("Toy Car".into())),
        ];
        msg.values[2].status = PropertyStatus::Unavailable;

        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_config_response_with_area_ranges_round_trip() {
        let mut speed = PropertyConfig::new(ids::PERF_VEHICLE_SPEED, PropertyAccess::Read, ChangeMode::Continuous)
            .with_sample_rates(1.0, 10.0);
        speed.config_array = vec![1, 2, 3];
        speed.config_string = "km/h".to_string();
        let mut msg = EmulatorMessage::response_to(MessageType::GetConfigAllCmd);
        msg.configs = vec![hvac_config(), speed];

        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_get_request_area_presence_is_preserved() {
        let mut msg = EmulatorMessage::new(MessageType::GetPropertyCmd);
        msg.get_requests = vec![GetRequest::new(1), GetRequest::for_area(2, 0)];

        let decoded = round_trip(&msg);

        assert_eq!(decoded.get_requests[0].area_id, None);
        assert_eq!(decoded.get_requests[1].area_id, Some(0));
    }

    #[test]
    fn test_debug_command_and_result_round_trip() {
        let mut cmd = EmulatorMessage::new(MessageType::DebugCmd);
        cmd.debug_commands = vec!["--get".into(), "0x11400400".into()];
        let mut resp = EmulatorMessage::response_to(MessageType::DebugCmd);
        resp.debug_result = Some(String::new());

        assert_eq!(round_trip(&cmd), cmd);
        // An empty result string is still "present".
        assert_eq!(round_trip(&resp).debug_result, Some(String::new()));
    }

    #[test]
    fn test_error_status_round_trip() {
        let msg = EmulatorMessage::response_to(MessageType::GetConfigCmd)
            .with_status(ResponseStatus::InvalidOperation);
        assert_eq!(round_trip(&msg).status, ResponseStatus::InvalidOperation);
    }

    #[test]
    fn test_unknown_message_type_decodes_as_other() {
        let mut bytes = encode_message(&EmulatorMessage::new(MessageType::DebugCmd)).unwrap();
        bytes[1] = 0x7F;

        let decoded = decode_message(&bytes).expect("unknown types must still decode");

        assert_eq!(decoded.message_type, MessageType::Other(0x7F));
    }

    // ── Error conditions ──────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        let result = decode_message(&[]);
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_wrong_version_returns_error() {
        let mut bytes = encode_message(&EmulatorMessage::new(MessageType::GetConfigAllCmd)).unwrap();
        bytes[0] = 0x99;
        assert_eq!(decode_message(&bytes), Err(ProtocolError::UnsupportedVersion(0x99)));
    }

    #[test]
    fn test_decode_unknown_status_returns_malformed() {
        let mut bytes = encode_message(&EmulatorMessage::new(MessageType::GetConfigAllCmd)).unwrap();
        bytes[2] = 0xEE;
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_truncated_value_returns_insufficient_data() {
        let msg = EmulatorMessage::set_property(PropertyValue::new(
            ids::GEAR_SELECTION,
            AREA_GLOBAL,
            PropertyPayload::Int32(vec![2]),
        ));
        let bytes = encode_message(&msg).unwrap();

        let result = decode_message(&bytes[..bytes.len() - 9]);

        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_trailing_bytes_returns_error() {
        let mut bytes = encode_message(&EmulatorMessage::new(MessageType::GetConfigAllCmd)).unwrap();
        bytes.extend_from_slice(&[0, 0, 0]);
        assert_eq!(decode_message(&bytes), Err(ProtocolError::TrailingBytes(3)));
    }

    #[test]
    fn test_decode_huge_element_count_does_not_allocate() {
        // Arrange: one value whose int32 payload claims u32::MAX elements.
        let mut bytes = vec![PROTOCOL_VERSION, 5, 0, 0, 0, 1];
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&0i64.to_be_bytes());
        bytes.push(0);
        bytes.push(TAG_INT32);
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());

        // Act / Assert
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_invalid_utf8_returns_malformed() {
        let mut msg = EmulatorMessage::new(MessageType::DebugCmd);
        msg.debug_commands = vec!["ab".into()];
        let mut bytes = encode_message(&msg).unwrap();
        let len = bytes.len();
        bytes[len - 2] = 0xFF;
        bytes[len - 1] = 0xFE;

        assert!(matches!(decode_message(&bytes), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_peek_message_type_reads_header_only() {
        assert_eq!(peek_message_type(&[PROTOCOL_VERSION, 4]), Some(MessageType::GetPropertyCmd));
        assert_eq!(peek_message_type(&[PROTOCOL_VERSION]), None);
    }

    #[test]
    fn test_encode_bare_decodes_to_empty_message() {
        // Act
        let bytes = encode_bare(MessageType::DebugResp, ResponseStatus::Unknown);

        // Assert
        let msg = decode_message(&bytes).expect("decode");
        assert_eq!(msg, EmulatorMessage::new(MessageType::DebugResp).with_status(ResponseStatus::Unknown));
        assert_eq!(bytes, encode_message(&msg).unwrap());
    }
}
