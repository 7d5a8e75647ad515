//! Diagnostic dump behind the protocol `Debug` command.

use std::fmt::Write as _;
use std::sync::Arc;

use vhal_core::{PropertyConfig, PropertyPayload, PropertyValue, AREA_GLOBAL};

use super::property_store::PropertyStore;

/// Produces the text returned in a `DebugResp`.
pub trait DebugHook: Send + Sync {
    fn dump(&self, args: &[String]) -> String;
}

const USAGE: &str = "\
usage:
  (no options)              dump every current value
  --list                    list every property configuration
  --get <prop-id> [area-id] dump one value; ids accept decimal or 0x-hex
  --help                    show this text
";

/// [`DebugHook`] that renders the contents of a [`PropertyStore`].
pub struct PropertyDumper {
    store: Arc<dyn PropertyStore>,
}

impl PropertyDumper {
    pub fn new(store: Arc<dyn PropertyStore>) -> Self {
        Self { store }
    }

    fn dump_values(&self) -> String {
        let values = self.store.read_all();
        let mut out = format!("{} values:\n", values.len());
        for value in &values {
            let _ = writeln!(out, "{}", format_value(value));
        }
        out
    }

    fn dump_configs(&self) -> String {
        let configs = self.store.get_all_configs();
        let mut out = format!("{} properties:\n", configs.len());
        for config in &configs {
            let _ = writeln!(out, "{}", format_config(config));
        }
        out
    }

    fn dump_one(&self, args: &[String]) -> String {
        let Some(prop_arg) = args.first() else {
            return format!("--get needs a property id\n{USAGE}");
        };
        let Some(prop_id) = parse_id(prop_arg) else {
            return format!("invalid property id '{prop_arg}'\n");
        };
        let area_id = match args.get(1) {
            Some(arg) => match parse_id(arg) {
                Some(area) => area,
                None => return format!("invalid area id '{arg}'\n"),
            },
            None => AREA_GLOBAL,
        };

        match self.store.read_one(prop_id, area_id) {
            Ok(value) => format!("{}\n", format_value(&value)),
            Err(e) => format!("{e}\n"),
        }
    }
}

impl DebugHook for PropertyDumper {
    fn dump(&self, args: &[String]) -> String {
        match args.first().map(String::as_str) {
            None => self.dump_values(),
            Some("--list") => self.dump_configs(),
            Some("--get") => self.dump_one(&args[1..]),
            Some("--help") => USAGE.to_string(),
            Some(other) => format!("unknown option '{other}'\n{USAGE}"),
        }
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal id.
///
/// Hex ids are read as 32-bit patterns, so `0x80000000` maps to a negative `i32`.
fn parse_id(text: &str) -> Option<i32> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(|v| v as i32),
        None => text.parse().ok(),
    }
}

fn format_value(value: &PropertyValue) -> String {
    format!(
        "prop={:#010x} area={} status={:?} ts={} {}",
        value.prop_id,
        value.area_id,
        value.status,
        value.timestamp_ns,
        format_payload(&value.payload)
    )
}

fn format_payload(payload: &PropertyPayload) -> String {
    match payload {
        PropertyPayload::Int32(v) => format!("int32={v:?}"),
        PropertyPayload::Int64(v) => format!("int64={v:?}"),
        PropertyPayload::Float(v) => format!("float={v:?}"),
        PropertyPayload::Bytes(v) => format!("bytes={v:02x?}"),
        PropertyPayload::String(s) => format!("string={s:?}"),
    }
}

fn format_config(config: &PropertyConfig) -> String {
    format!(
        "prop={:#010x} access={:?} change_mode={:?} areas={:?}",
        config.prop_id,
        config.access,
        config.change_mode,
        config.area_ids()
    )
}
