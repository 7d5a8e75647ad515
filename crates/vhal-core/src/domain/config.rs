//! Static property configuration: access, change mode, and per-area limits.

use serde::{Deserialize, Serialize};

use super::property::{PropertyPayload, AREA_GLOBAL};

/// Who may read or write a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum PropertyAccess {
    Read = 0x01,
    Write = 0x02,
    ReadWrite = 0x03,
}

impl PropertyAccess {
    pub fn can_read(self) -> bool {
        matches!(self, PropertyAccess::Read | PropertyAccess::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, PropertyAccess::Write | PropertyAccess::ReadWrite)
    }
}

impl TryFrom<u8> for PropertyAccess {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(PropertyAccess::Read),
            0x02 => Ok(PropertyAccess::Write),
            0x03 => Ok(PropertyAccess::ReadWrite),
            _ => Err(()),
        }
    }
}

/// When a property's value is expected to be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum ChangeMode {
    Static = 0x00,
    OnChange = 0x01,
    Continuous = 0x02,
}

impl TryFrom<u8> for ChangeMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(ChangeMode::Static),
            0x01 => Ok(ChangeMode::OnChange),
            0x02 => Ok(ChangeMode::Continuous),
            _ => Err(()),
        }
    }
}

/// Inclusive value limits for one area. Absent for vector, string and byte types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AreaRange {
    Int32 { min: i32, max: i32 },
    Int64 { min: i64, max: i64 },
    Float { min: f32, max: f32 },
}

impl AreaRange {
    /// Returns `true` if every element of `payload` lies within the range.
    ///
    /// A range of one numeric kind says nothing about payloads of another
    /// kind; those are accepted here and left to the type check.
    /// A `min == max == 0` range means "unbounded".
    pub fn contains(&self, payload: &PropertyPayload) -> bool {
        match (*self, payload) {
            (AreaRange::Int32 { min: 0, max: 0 }, _)
            | (AreaRange::Int64 { min: 0, max: 0 }, _) => true,
            (AreaRange::Float { min, max }, _) if min == 0.0 && max == 0.0 => true,
            (AreaRange::Int32 { min, max }, PropertyPayload::Int32(v)) => {
                v.iter().all(|x| (min..=max).contains(x))
            }
            (AreaRange::Int64 { min, max }, PropertyPayload::Int64(v)) => {
                v.iter().all(|x| (min..=max).contains(x))
            }
            (AreaRange::Float { min, max }, PropertyPayload::Float(v)) => {
                v.iter().all(|x| *x >= min && *x <= max)
            }
            _ => true,
        }
    }
}

/// Configuration of one area of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaConfig {
    pub area_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<AreaRange>,
}

impl AreaConfig {
    pub fn new(area_id: i32) -> Self {
        Self { area_id, range: None }
    }

    pub fn with_range(area_id: i32, range: AreaRange) -> Self {
        Self {
            area_id,
            range: Some(range),
        }
    }
}

/// Static description of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub prop_id: i32,
    pub access: PropertyAccess,
    pub change_mode: ChangeMode,
    #[serde(default)]
    pub config_array: Vec<i32>,
    #[serde(default)]
    pub config_string: String,
    /// Sample rate bounds in Hz; only meaningful for continuous properties.
    #[serde(default)]
    pub min_sample_rate: f32,
    #[serde(default)]
    pub max_sample_rate: f32,
    #[serde(default)]
    pub area_configs: Vec<AreaConfig>,
}

impl PropertyConfig {
    /// Creates a config with no areas listed, which makes it a global property.
    pub fn new(prop_id: i32, access: PropertyAccess, change_mode: ChangeMode) -> Self {
        Self {
            prop_id,
            access,
            change_mode,
            config_array: Vec::new(),
            config_string: String::new(),
            min_sample_rate: 0.0,
            max_sample_rate: 0.0,
            area_configs: Vec::new(),
        }
    }

    pub fn with_areas(mut self, areas: Vec<AreaConfig>) -> Self {
        self.area_configs = areas;
        self
    }

    pub fn with_sample_rates(mut self, min: f32, max: f32) -> Self {
        self.min_sample_rate = min;
        self.max_sample_rate = max;
        self
    }

    /// Area ids addressable on this property. A config without areas is global.
    pub fn area_ids(&self) -> Vec<i32> {
        if self.area_configs.is_empty() {
            vec![AREA_GLOBAL]
        } else {
            self.area_configs.iter().map(|a| a.area_id).collect()
        }
    }

    pub fn supports_area(&self, area_id: i32) -> bool {
        self.area_ids().contains(&area_id)
    }

    pub fn area_config(&self, area_id: i32) -> Option<&AreaConfig> {
        self.area_configs.iter().find(|a| a.area_id == area_id)
    }
}
