//! Static field specifications: which OBIS codes a telegram of a given
//! protocol version may carry, and how to decode each of them.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// How the value of a field is typed.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Numeric,
    Text,
    Timestamp,
    /// Integer code decoded to a name via a fixed code -> name table.
    Enumerated(&'static [(u32, &'static str)]),
}

/// Which value group of the data line carries the reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParseRule {
    /// Single group: `1-0:1.7.0(00.244*kW)`
    Value,
    /// Timestamp group followed by the reading: `0-1:24.2.1(101209112500W)(12785.123*m3)`
    TimestampedValue,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Unit the standard declares for this field. Informational only; the
    /// decoded value keeps the unit as transmitted.
    pub unit: Option<&'static str>,
    pub rule: ParseRule,
}

/// Immutable OBIS code -> field table for one protocol version. Built once
/// at startup and shared read-only across all decoding.
#[derive(Debug, Clone)]
pub struct TelegramSpec {
    pub version: &'static str,
    pub fields: HashMap<&'static str, FieldSpec>,
}

impl TelegramSpec {
    pub fn get(&self, obis: &str) -> Option<&FieldSpec> {
        self.fields.get(obis)
    }
}

/// Tariff codes as sent in 0-0:96.14.0. State names keep the spelling of the
/// historical exporter so existing dashboards keep working.
pub const TARIFF_STATES: &[(u32, &str)] = &[(1, "tarrif_1"), (2, "tarrif_2")];

lazy_static! {
    /// DSMR V5 field layout.
    pub static ref V5: TelegramSpec = v5();
}

fn numeric(name: &'static str, unit: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Numeric,
        unit: if unit.is_empty() { None } else { Some(unit) },
        rule: ParseRule::Value,
    }
}

fn text(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        unit: None,
        rule: ParseRule::Value,
    }
}

fn v5() -> TelegramSpec {
    let mut fields = HashMap::new();

    fields.insert("1-3:0.2.8", text("P1_MESSAGE_HEADER"));
    fields.insert(
        "0-0:1.0.0",
        FieldSpec {
            name: "P1_MESSAGE_TIMESTAMP",
            kind: FieldKind::Timestamp,
            unit: None,
            rule: ParseRule::Value,
        },
    );
    fields.insert("0-0:96.1.1", text("EQUIPMENT_IDENTIFIER"));
    fields.insert("0-0:96.13.0", text("TEXT_MESSAGE"));

    // Tariff energy registers
    fields.insert("1-0:1.8.1", numeric("ELECTRICITY_USED_TARIFF_1", "kWh"));
    fields.insert("1-0:1.8.2", numeric("ELECTRICITY_USED_TARIFF_2", "kWh"));
    fields.insert("1-0:2.8.1", numeric("ELECTRICITY_DELIVERED_TARIFF_1", "kWh"));
    fields.insert("1-0:2.8.2", numeric("ELECTRICITY_DELIVERED_TARIFF_2", "kWh"));
    fields.insert(
        "0-0:96.14.0",
        FieldSpec {
            name: "ELECTRICITY_ACTIVE_TARIFF",
            kind: FieldKind::Enumerated(TARIFF_STATES),
            unit: None,
            rule: ParseRule::Value,
        },
    );

    // Instantaneous totals
    fields.insert("1-0:1.7.0", numeric("CURRENT_ELECTRICITY_USAGE", "kW"));
    fields.insert("1-0:2.7.0", numeric("CURRENT_ELECTRICITY_DELIVERY", "kW"));

    // Power failure counters
    fields.insert("0-0:96.7.21", numeric("SHORT_POWER_FAILURE_COUNT", ""));
    fields.insert("0-0:96.7.9", numeric("LONG_POWER_FAILURE_COUNT", ""));

    // Sag / swell counters per phase
    fields.insert("1-0:32.32.0", numeric("VOLTAGE_SAG_L1_COUNT", ""));
    fields.insert("1-0:52.32.0", numeric("VOLTAGE_SAG_L2_COUNT", ""));
    fields.insert("1-0:72.32.0", numeric("VOLTAGE_SAG_L3_COUNT", ""));
    fields.insert("1-0:32.36.0", numeric("VOLTAGE_SWELL_L1_COUNT", ""));
    fields.insert("1-0:52.36.0", numeric("VOLTAGE_SWELL_L2_COUNT", ""));
    fields.insert("1-0:72.36.0", numeric("VOLTAGE_SWELL_L3_COUNT", ""));

    // Instantaneous per-phase readings
    fields.insert("1-0:32.7.0", numeric("INSTANTANEOUS_VOLTAGE_L1", "V"));
    fields.insert("1-0:52.7.0", numeric("INSTANTANEOUS_VOLTAGE_L2", "V"));
    fields.insert("1-0:72.7.0", numeric("INSTANTANEOUS_VOLTAGE_L3", "V"));
    fields.insert("1-0:31.7.0", numeric("INSTANTANEOUS_CURRENT_L1", "A"));
    fields.insert("1-0:51.7.0", numeric("INSTANTANEOUS_CURRENT_L2", "A"));
    fields.insert("1-0:71.7.0", numeric("INSTANTANEOUS_CURRENT_L3", "A"));
    fields.insert("1-0:21.7.0", numeric("INSTANTANEOUS_ACTIVE_POWER_L1_POSITIVE", "kW"));
    fields.insert("1-0:41.7.0", numeric("INSTANTANEOUS_ACTIVE_POWER_L2_POSITIVE", "kW"));
    fields.insert("1-0:61.7.0", numeric("INSTANTANEOUS_ACTIVE_POWER_L3_POSITIVE", "kW"));
    fields.insert("1-0:22.7.0", numeric("INSTANTANEOUS_ACTIVE_POWER_L1_NEGATIVE", "kW"));
    fields.insert("1-0:42.7.0", numeric("INSTANTANEOUS_ACTIVE_POWER_L2_NEGATIVE", "kW"));
    fields.insert("1-0:62.7.0", numeric("INSTANTANEOUS_ACTIVE_POWER_L3_NEGATIVE", "kW"));

    // M-Bus slave (gas meter) on channel 1
    fields.insert("0-1:24.1.0", numeric("DEVICE_TYPE", ""));
    fields.insert("0-1:96.1.0", text("EQUIPMENT_IDENTIFIER_GAS"));
    fields.insert(
        "0-1:24.2.1",
        FieldSpec {
            name: "HOURLY_GAS_METER_READING",
            kind: FieldKind::Numeric,
            unit: Some("m3"),
            rule: ParseRule::TimestampedValue,
        },
    );

    TelegramSpec {
        version: "V5",
        fields,
    }
}
