use chrono::NaiveDateTime;
use std::collections::HashMap;

/// One complete P1 transmission, as framed and checksum-verified by the reader.
#[derive(Debug, Clone)]
pub struct Telegram {
    /// Identification line, e.g. "/XMX5LGBBFG1009325446"
    pub identification: String,
    /// Raw body lines between the identification line and the '!' terminator.
    pub lines: Vec<String>,
    /// CRC16 as transmitted in the telegram trailer.
    pub checksum: u16,
}

/// One body line split into its OBIS code and parenthesized value groups.
#[derive(Debug, Clone)]
pub struct DataLine {
    pub obis: String,
    pub groups: Vec<String>,
}

/// A decoded value for a single field of the telegram specification.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Numeric reading with the unit exactly as transmitted (no conversion).
    Numeric { value: f64, unit: Option<String> },
    Text(String),
    Timestamp(NaiveDateTime),
    /// One name out of the fixed state set of an enumerated field.
    State(&'static str),
}

/// Result of decoding one telegram: field name -> typed value.
///
/// Only fields present in both the telegram and the active specification
/// appear here; absent fields are simply absent.
#[derive(Debug, Clone, Default)]
pub struct DecodedRecord {
    pub fields: HashMap<&'static str, FieldValue>,
}

impl DecodedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
