//! Property values and the type/area information packed into property ids.
//!
//! A vehicle property id is a 32-bit integer whose upper bits describe the
//! property rather than merely naming it:
//!
//! ```text
//!  31..28   27..24     23..16          15..0
//! [group ][area type][value type   ][ unique id ]
//! ```
//!
//! The value-type bits decide which [`PropertyPayload`] variant a value of the
//! property may carry; the area-type bits decide how the area id is read.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Area id denoting the whole vehicle.
pub const AREA_GLOBAL: i32 = 0;

const TYPE_MASK: i32 = 0x00ff_0000;
const AREA_MASK: i32 = 0x0f00_0000;

/// Well-known property ids used by the default catalogue and write policy.
pub mod ids {
    pub const INFO_MAKE: i32 = 0x1110_0101;
    pub const INFO_MODEL_YEAR: i32 = 0x1140_0104;
    pub const PERF_VEHICLE_SPEED: i32 = 0x1160_0207;
    pub const GEAR_SELECTION: i32 = 0x1140_0400;
    pub const PARKING_BRAKE_ON: i32 = 0x1120_0402;
    pub const DISPLAY_BRIGHTNESS: i32 = 0x1140_0A01;
    pub const HVAC_FAN_SPEED: i32 = 0x1540_0500;
    pub const HVAC_TEMPERATURE_SET: i32 = 0x1560_0503;
    pub const HVAC_POWER_ON: i32 = 0x1520_0510;
}

/// Seat area ids.
pub mod seat {
    pub const ROW_1_LEFT: i32 = 0x0001;
    pub const ROW_1_RIGHT: i32 = 0x0004;
}

/// Declared value type of a property, decoded from its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Boolean,
    Int32,
    Int32Vec,
    Int64,
    Int64Vec,
    Float,
    FloatVec,
    Bytes,
    Mixed,
}

impl PropertyType {
    /// Returns the type encoded in `prop_id`, or `None` for an unknown type field.
    pub fn of(prop_id: i32) -> Option<Self> {
        match prop_id & TYPE_MASK {
            0x0010_0000 => Some(PropertyType::String),
            0x0020_0000 => Some(PropertyType::Boolean),
            0x0040_0000 => Some(PropertyType::Int32),
            0x0041_0000 => Some(PropertyType::Int32Vec),
            0x0050_0000 => Some(PropertyType::Int64),
            0x0051_0000 => Some(PropertyType::Int64Vec),
            0x0060_0000 => Some(PropertyType::Float),
            0x0061_0000 => Some(PropertyType::FloatVec),
            0x0070_0000 => Some(PropertyType::Bytes),
            0x00e0_0000 => Some(PropertyType::Mixed),
            _ => None,
        }
    }
}

/// How the area id of a property is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaType {
    Global,
    Window,
    Mirror,
    Seat,
    Door,
    Wheel,
}

impl AreaType {
    /// Returns the area type encoded in `prop_id`.
    pub fn of(prop_id: i32) -> Option<Self> {
        match prop_id & AREA_MASK {
            0x0100_0000 => Some(AreaType::Global),
            0x0300_0000 => Some(AreaType::Window),
            0x0400_0000 => Some(AreaType::Mirror),
            0x0500_0000 => Some(AreaType::Seat),
            0x0600_0000 => Some(AreaType::Door),
            0x0700_0000 => Some(AreaType::Wheel),
            _ => None,
        }
    }
}

/// Availability of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PropertyStatus {
    #[default]
    Available = 0,
    Unavailable = 1,
    Error = 2,
}

impl TryFrom<u8> for PropertyStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(PropertyStatus::Available),
            1 => Ok(PropertyStatus::Unavailable),
            2 => Ok(PropertyStatus::Error),
            _ => Err(()),
        }
    }
}

/// The typed content of a property value. Exactly one kind per value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyPayload {
    /// Scalar int32 (one element), boolean (0/1) or int32 vector.
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Bytes(Vec<u8>),
    String(String),
}

impl PropertyPayload {
    /// Returns `true` if this payload is legal for a property of type `ty`.
    pub fn matches(&self, ty: PropertyType) -> bool {
        match (ty, self) {
            (PropertyType::Mixed, _) => true,
            (PropertyType::Int32 | PropertyType::Boolean, PropertyPayload::Int32(v)) => v.len() == 1,
            (PropertyType::Int32Vec, PropertyPayload::Int32(_)) => true,
            (PropertyType::Int64, PropertyPayload::Int64(v)) => v.len() == 1,
            (PropertyType::Int64Vec, PropertyPayload::Int64(_)) => true,
            (PropertyType::Float, PropertyPayload::Float(v)) => v.len() == 1,
            (PropertyType::FloatVec, PropertyPayload::Float(_)) => true,
            (PropertyType::Bytes, PropertyPayload::Bytes(_)) => true,
            (PropertyType::String, PropertyPayload::String(_)) => true,
            _ => false,
        }
    }

    /// Zero value for a property of type `ty`, used when seeding a store.
    pub fn zero_for(ty: PropertyType) -> Self {
        match ty {
            PropertyType::Int32 | PropertyType::Boolean => PropertyPayload::Int32(vec![0]),
            PropertyType::Int32Vec | PropertyType::Mixed => PropertyPayload::Int32(Vec::new()),
            PropertyType::Int64 => PropertyPayload::Int64(vec![0]),
            PropertyType::Int64Vec => PropertyPayload::Int64(Vec::new()),
            PropertyType::Float => PropertyPayload::Float(vec![0.0]),
            PropertyType::FloatVec => PropertyPayload::Float(Vec::new()),
            PropertyType::Bytes => PropertyPayload::Bytes(Vec::new()),
            PropertyType::String => PropertyPayload::String(String::new()),
        }
    }

    /// Short name of the payload kind, for log and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyPayload::Int32(_) => "int32",
            PropertyPayload::Int64(_) => "int64",
            PropertyPayload::Float(_) => "float",
            PropertyPayload::Bytes(_) => "bytes",
            PropertyPayload::String(_) => "string",
        }
    }
}

/// Serde helpers for property ids written in config files.
///
/// Ids are bit patterns, so both `-2147483648` and `0x80000000` name the same
/// property. Any integer that fits in 32 bits as signed or unsigned is
/// accepted and reinterpreted as `i32`.
pub mod id_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    fn from_wide<E: Error>(raw: i64) -> Result<i32, E> {
        i32::try_from(raw)
            .or_else(|_| u32::try_from(raw).map(|bits| bits as i32))
            .map_err(|_| E::custom(format!("property id {raw} does not fit in 32 bits")))
    }

    /// Deserializes one property id.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
        from_wide(i64::deserialize(deserializer)?)
    }

    /// Deserializes a list of property ids.
    pub fn deserialize_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i32>, D::Error> {
        Vec::<i64>::deserialize(deserializer)?
            .into_iter()
            .map(from_wide)
            .collect()
    }
}

/// A single addressed value of a vehicle property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    #[serde(deserialize_with = "id_serde::deserialize")]
    pub prop_id: i32,
    #[serde(default)]
    pub area_id: i32,
    /// Nanoseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp_ns: i64,
    #[serde(default)]
    pub status: PropertyStatus,
    pub payload: PropertyPayload,
}

impl PropertyValue {
    /// Creates an available value stamped with the current time.
    pub fn new(prop_id: i32, area_id: i32, payload: PropertyPayload) -> Self {
        Self {
            prop_id,
            area_id,
            timestamp_ns: timestamp_now_ns(),
            status: PropertyStatus::Available,
            payload,
        }
    }

    /// Returns the declared type of this value's property.
    pub fn property_type(&self) -> Option<PropertyType> {
        PropertyType::of(self.prop_id)
    }

    /// Replaces the timestamp with the current time.
    pub fn refresh_timestamp(&mut self) {
        self.timestamp_ns = timestamp_now_ns();
    }
}

/// Nanoseconds since the Unix epoch, or 0 if the clock is before it.
pub fn timestamp_now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_decoded_from_well_known_ids() {
        assert_eq!(PropertyType::of(ids::INFO_MAKE), Some(PropertyType::String));
        assert_eq!(PropertyType::of(ids::PARKING_BRAKE_ON), Some(PropertyType::Boolean));
        assert_eq!(PropertyType::of(ids::DISPLAY_BRIGHTNESS), Some(PropertyType::Int32));
        assert_eq!(PropertyType::of(ids::PERF_VEHICLE_SPEED), Some(PropertyType::Float));
    }

    #[test]
    fn test_property_type_unknown_bits_returns_none() {
        assert_eq!(PropertyType::of(0x1130_0001), None);
    }

    #[test]
    fn test_area_type_decoded_from_well_known_ids() {
        assert_eq!(AreaType::of(ids::GEAR_SELECTION), Some(AreaType::Global));
        assert_eq!(AreaType::of(ids::HVAC_TEMPERATURE_SET), Some(AreaType::Seat));
    }

    #[test]
    fn test_scalar_int32_payload_requires_exactly_one_element() {
        assert!(PropertyPayload::Int32(vec![3]).matches(PropertyType::Int32));
        assert!(!PropertyPayload::Int32(vec![]).matches(PropertyType::Int32));
        assert!(!PropertyPayload::Int32(vec![1, 2]).matches(PropertyType::Boolean));
    }

    #[test]
    fn test_vector_payload_accepts_any_length() {
        assert!(PropertyPayload::Int32(vec![]).matches(PropertyType::Int32Vec));
        assert!(PropertyPayload::Float(vec![1.0, 2.0, 3.0]).matches(PropertyType::FloatVec));
    }

    #[test]
    fn test_mismatched_payload_kind_is_rejected() {
        assert!(!PropertyPayload::String("x".into()).matches(PropertyType::Int32));
        assert!(!PropertyPayload::Float(vec![1.0]).matches(PropertyType::Int64));
    }

    #[test]
    fn test_mixed_type_accepts_any_payload() {
        assert!(PropertyPayload::Bytes(vec![1]).matches(PropertyType::Mixed));
        assert!(PropertyPayload::String("m".into()).matches(PropertyType::Mixed));
    }

    #[test]
    fn test_zero_payload_matches_its_own_type() {
        for ty in [
            PropertyType::String,
            PropertyType::Boolean,
            PropertyType::Int32,
            PropertyType::Int32Vec,
            PropertyType::Int64,
            PropertyType::Int64Vec,
            PropertyType::Float,
            PropertyType::FloatVec,
            PropertyType::Bytes,
            PropertyType::Mixed,
        ] {
            assert!(PropertyPayload::zero_for(ty).matches(ty), "{ty:?}");
        }
    }

    #[test]
    fn test_new_value_is_available_and_timestamped() {
        let value = PropertyValue::new(ids::GEAR_SELECTION, AREA_GLOBAL, PropertyPayload::Int32(vec![4]));
        assert_eq!(value.status, PropertyStatus::Available);
        assert!(value.timestamp_ns > 0);
    }

    #[test]
    fn test_property_value_deserializes_from_toml_with_defaults() {
        // Arrange
        let text = r#"
prop_id = 289408000
payload = { int32 = [8] }
"#;

        // Act
        let value: PropertyValue = toml::from_str(text).expect("deserialize");

        // Assert
        assert_eq!(value.prop_id, ids::GEAR_SELECTION);
        assert_eq!(value.area_id, AREA_GLOBAL);
        assert_eq!(value.status, PropertyStatus::Available);
        assert_eq!(value.payload, PropertyPayload::Int32(vec![8]));
    }

    #[test]
    fn test_property_value_accepts_high_bit_hex_id() {
        let value: PropertyValue =
            toml::from_str("prop_id = 0x80000001\npayload = { int32 = [1] }\n").expect("deserialize");

        assert_eq!(value.prop_id, 0x8000_0001_u32 as i32);
    }

    #[test]
    fn test_property_id_wider_than_32_bits_is_rejected() {
        let result: Result<PropertyValue, _> =
            toml::from_str("prop_id = 0x100000000\npayload = { int32 = [1] }\n");

        assert!(result.is_err());
    }
}
