//! Telegram decoding: raw body lines -> typed [`DecodedRecord`] per the
//! active field specification.

use super::obis_parser;
use super::structs::{DataLine, DecodedRecord, FieldValue, Telegram};
use super::telegram_spec::{FieldKind, FieldSpec, ParseRule, TelegramSpec};
use super::DsmrError;
use chrono::NaiveDateTime;
use log::{debug, warn};

/// Decode one telegram against `spec`.
///
/// Lines with OBIS codes the spec does not know are skipped: newer meter
/// firmware adds fields, and an exporter must not die on them. A known field
/// whose value does not parse aborts the whole telegram instead; partial
/// records never leave this function.
pub fn decode(telegram: &Telegram, spec: &TelegramSpec) -> Result<DecodedRecord, DsmrError> {
    let mut record = DecodedRecord::new();

    for raw in &telegram.lines {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let line = match obis_parser::parse_data_line(raw) {
            Ok(line) => line,
            Err(e) => {
                // The checksum already passed, so this is an unsupported
                // construct rather than corruption.
                warn!("skipping unsupported data line: {}", e);
                continue;
            }
        };

        let Some(field) = spec.get(&line.obis) else {
            debug!("no field registered for OBIS {}, line skipped", line.obis);
            continue;
        };

        let value = decode_field(field, &line)?;
        record.fields.insert(field.name, value);
    }

    Ok(record)
}

fn decode_field(field: &FieldSpec, line: &DataLine) -> Result<FieldValue, DsmrError> {
    let group = match field.rule {
        ParseRule::Value => line.groups.first(),
        ParseRule::TimestampedValue => line.groups.get(1),
    }
    .ok_or_else(|| field_error(line, "missing value group"))?;

    match &field.kind {
        FieldKind::Numeric => {
            let (number, unit) = match group.split_once('*') {
                Some((number, unit)) => (number, Some(unit.to_string())),
                None => (group.as_str(), None),
            };
            let value: f64 = number
                .parse()
                .map_err(|_| field_error(line, "expected a numeric value"))?;
            Ok(FieldValue::Numeric { value, unit })
        }
        FieldKind::Text => Ok(FieldValue::Text(group.clone())),
        FieldKind::Timestamp => {
            // YYMMDDhhmmssX, X being the DST flag (W/S).
            let digits = group
                .strip_suffix('W')
                .or_else(|| group.strip_suffix('S'))
                .unwrap_or(group);
            let ts = NaiveDateTime::parse_from_str(digits, "%y%m%d%H%M%S")
                .map_err(|_| field_error(line, "expected a TST timestamp"))?;
            Ok(FieldValue::Timestamp(ts))
        }
        FieldKind::Enumerated(table) => {
            let code: u32 = group
                .trim()
                .parse()
                .map_err(|_| field_error(line, "expected an integer state code"))?;
            table
                .iter()
                .find(|entry| entry.0 == code)
                .map(|entry| FieldValue::State(entry.1))
                .ok_or_else(|| field_error(line, "not a recognized state code"))
        }
    }
}

fn field_error(line: &DataLine, reason: &str) -> DsmrError {
    DsmrError::FieldDecode {
        obis: line.obis.clone(),
        value: line.groups.join(")("),
        reason: reason.to_string(),
    }
}
