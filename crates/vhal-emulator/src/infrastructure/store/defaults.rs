//! Built-in property catalogue of the emulated vehicle.

use vhal_core::domain::property::{ids, seat};
use vhal_core::{
    AreaConfig, AreaRange, ChangeMode, PropertyAccess, PropertyConfig, PropertyPayload,
    PropertyValue, AREA_GLOBAL,
};

/// Front-row seats carrying per-seat HVAC properties.
const HVAC_SEATS: [i32; 2] = [seat::ROW_1_LEFT, seat::ROW_1_RIGHT];

/// Configurations of every property the default vehicle exposes.
pub fn default_configs() -> Vec<PropertyConfig> {
    let per_seat = |range: Option<AreaRange>| -> Vec<AreaConfig> {
        HVAC_SEATS
            .iter()
            .map(|&area| AreaConfig { area_id: area, range })
            .collect()
    };

    vec![
        PropertyConfig::new(ids::INFO_MAKE, PropertyAccess::Read, ChangeMode::Static),
        PropertyConfig::new(ids::INFO_MODEL_YEAR, PropertyAccess::Read, ChangeMode::Static),
        PropertyConfig::new(ids::PERF_VEHICLE_SPEED, PropertyAccess::Read, ChangeMode::Continuous)
            .with_sample_rates(1.0, 10.0),
        PropertyConfig::new(ids::GEAR_SELECTION, PropertyAccess::ReadWrite, ChangeMode::OnChange),
        PropertyConfig::new(ids::PARKING_BRAKE_ON, PropertyAccess::Read, ChangeMode::OnChange),
        PropertyConfig::new(ids::DISPLAY_BRIGHTNESS, PropertyAccess::ReadWrite, ChangeMode::OnChange)
            .with_areas(vec![AreaConfig::with_range(
                AREA_GLOBAL,
                AreaRange::Int32 { min: 0, max: 100 },
            )]),
        PropertyConfig::new(ids::HVAC_POWER_ON, PropertyAccess::ReadWrite, ChangeMode::OnChange)
            .with_areas(per_seat(None)),
        PropertyConfig::new(ids::HVAC_FAN_SPEED, PropertyAccess::ReadWrite, ChangeMode::OnChange)
            .with_areas(per_seat(Some(AreaRange::Int32 { min: 1, max: 6 }))),
        PropertyConfig::new(ids::HVAC_TEMPERATURE_SET, PropertyAccess::ReadWrite, ChangeMode::OnChange)
            .with_areas(per_seat(Some(AreaRange::Float { min: 16.0, max: 28.0 }))),
    ]
}

/// Values the default vehicle starts with. Areas not listed start at zero.
pub fn default_values() -> Vec<PropertyValue> {
    let mut values = vec![
        PropertyValue::new(ids::INFO_MAKE, AREA_GLOBAL, PropertyPayload::String("Toy Vehicle".into())),
        PropertyValue::new(ids::INFO_MODEL_YEAR, AREA_GLOBAL, PropertyPayload::Int32(vec![2024])),
        PropertyValue::new(ids::PERF_VEHICLE_SPEED, AREA_GLOBAL, PropertyPayload::Float(vec![0.0])),
        PropertyValue::new(ids::GEAR_SELECTION, AREA_GLOBAL, PropertyPayload::Int32(vec![4])),
        PropertyValue::new(ids::PARKING_BRAKE_ON, AREA_GLOBAL, PropertyPayload::Int32(vec![1])),
        PropertyValue::new(ids::DISPLAY_BRIGHTNESS, AREA_GLOBAL, PropertyPayload::Int32(vec![50])),
    ];
    for area in HVAC_SEATS {
        values.push(PropertyValue::new(ids::HVAC_POWER_ON, area, PropertyPayload::Int32(vec![1])));
        values.push(PropertyValue::new(ids::HVAC_FAN_SPEED, area, PropertyPayload::Int32(vec![3])));
        values.push(PropertyValue::new(
            ids::HVAC_TEMPERATURE_SET,
            area,
            PropertyPayload::Float(vec![21.0]),
        ));
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_default_value_has_a_config_and_matching_type() {
        let configs = default_configs();
        for value in default_values() {
            let config = configs
                .iter()
                .find(|c| c.prop_id == value.prop_id)
                .unwrap_or_else(|| panic!("no config for {:#010x}", value.prop_id));
            assert!(config.supports_area(value.area_id));
            let ty = value.property_type().expect("known type");
            assert!(value.payload.matches(ty), "{:#010x}", value.prop_id);
        }
    }

    #[test]
    fn test_default_values_respect_area_ranges() {
        let configs = default_configs();
        for value in default_values() {
            let config = configs.iter().find(|c| c.prop_id == value.prop_id).unwrap();
            if let Some(range) = config.area_config(value.area_id).and_then(|a| a.range) {
                assert!(range.contains(&value.payload), "{:#010x}", value.prop_id);
            }
        }
    }
}
