//! Latest-value metric registry and its Prometheus text rendering.
//!
//! This is the only state shared between the ingestion loop and the scrape
//! endpoint. Writes replace value and timestamp together under one short
//! write lock; readers clone a snapshot and encode outside the lock, so a
//! slow scrape can never stall ingestion.

use crate::dsmr::structs::{DecodedRecord, FieldValue};
use log::warn;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy)]
pub enum MetricKind {
    /// Arbitrary real number, latest reading wins.
    Gauge,
    /// Exactly one active label out of a fixed state set.
    Enum(&'static [&'static str]),
}

/// Declarative link from a decoded field to an exported metric.
pub struct MetricMapping {
    pub field: &'static str,
    pub metric: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

const TARIFF_STATES: &[&str] = &["tarrif_1", "tarrif_2"];

/// The exported metric surface. Metric names and state labels are part of
/// the scrape contract; renaming them breaks existing dashboards.
pub const DEFAULT_MAPPINGS: &[MetricMapping] = &[
    MetricMapping {
        field: "CURRENT_ELECTRICITY_USAGE",
        metric: "current_elec_usage",
        help: "Current electricity usage (kW)",
        kind: MetricKind::Gauge,
    },
    MetricMapping {
        field: "INSTANTANEOUS_VOLTAGE_L1",
        metric: "instant_voltage",
        help: "Instantaneous voltage L1 (V)",
        kind: MetricKind::Gauge,
    },
    MetricMapping {
        field: "INSTANTANEOUS_CURRENT_L1",
        metric: "instant_current",
        help: "Instantaneous current L1 (A)",
        kind: MetricKind::Gauge,
    },
    MetricMapping {
        field: "ELECTRICITY_USED_TARIFF_1",
        metric: "tariff_1_elec",
        help: "Electricity usage for tariff 1 (kWh)",
        kind: MetricKind::Gauge,
    },
    MetricMapping {
        field: "ELECTRICITY_USED_TARIFF_2",
        metric: "tariff_2_elec",
        help: "Electricity usage for tariff 2 (kWh)",
        kind: MetricKind::Gauge,
    },
    MetricMapping {
        field: "ELECTRICITY_ACTIVE_TARIFF",
        metric: "active_tariff",
        help: "Current tariff",
        kind: MetricKind::Enum(TARIFF_STATES),
    },
    MetricMapping {
        field: "SHORT_POWER_FAILURE_COUNT",
        metric: "pwr_fail_cnt",
        help: "Number of power failures (short or long)",
        kind: MetricKind::Gauge,
    },
    MetricMapping {
        field: "VOLTAGE_SAG_L1_COUNT",
        metric: "voltage_sag_cnt",
        help: "Number of voltage sags",
        kind: MetricKind::Gauge,
    },
    MetricMapping {
        field: "VOLTAGE_SWELL_L1_COUNT",
        metric: "voltage_swell_cnt",
        help: "Number of voltage swell",
        kind: MetricKind::Gauge,
    },
];

#[derive(Debug, Clone)]
enum EntryValue {
    Gauge(f64),
    /// Single active index: a state change is one word write, so no reader
    /// ever sees zero or two active states.
    Enum {
        states: &'static [&'static str],
        active: usize,
    },
}

#[derive(Debug, Clone)]
struct Entry {
    metric: &'static str,
    help: &'static str,
    value: EntryValue,
    last_update: Option<u64>,
}

/// Point-in-time view of one metric, for tests and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub metric: &'static str,
    pub value: MetricValue,
    pub last_update: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    State(&'static str),
}

pub struct MetricRegistry {
    entries: RwLock<Vec<Entry>>,
    by_field: HashMap<&'static str, usize>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::with_mappings(DEFAULT_MAPPINGS)
    }

    pub fn with_mappings(mappings: &'static [MetricMapping]) -> Self {
        let mut entries = Vec::with_capacity(mappings.len());
        let mut by_field = HashMap::with_capacity(mappings.len());
        for mapping in mappings {
            by_field.insert(mapping.field, entries.len());
            entries.push(Entry {
                metric: mapping.metric,
                help: mapping.help,
                value: match mapping.kind {
                    MetricKind::Gauge => EntryValue::Gauge(0.0),
                    // Enums start on their first state, the way
                    // prometheus_client initialises an Enum.
                    MetricKind::Enum(states) => EntryValue::Enum { states, active: 0 },
                },
                last_update: None,
            });
        }
        MetricRegistry {
            entries: RwLock::new(entries),
            by_field,
        }
    }

    /// Fold one decoded telegram into the registry. Fields without a
    /// mapping are ignored; mapped fields overwrite value and timestamp.
    pub fn apply(&self, record: &DecodedRecord) {
        let now = crate::get_unix_ts();
        let mut entries = self.entries.write().unwrap();
        for (field, value) in &record.fields {
            let Some(&idx) = self.by_field.get(field) else {
                continue;
            };
            let entry = &mut entries[idx];
            match (&mut entry.value, value) {
                (EntryValue::Gauge(current), FieldValue::Numeric { value, .. }) => {
                    *current = *value;
                    entry.last_update = Some(now);
                }
                (EntryValue::Enum { states, active }, FieldValue::State(name)) => {
                    match states.iter().position(|s| s == name) {
                        Some(i) => {
                            *active = i;
                            entry.last_update = Some(now);
                        }
                        None => warn!(
                            "state '{}' of field {} is not registered for metric {}",
                            name, field, entry.metric
                        ),
                    }
                }
                _ => warn!(
                    "field {} carries a value type that does not fit metric {}",
                    field, entry.metric
                ),
            }
        }
    }

    /// Consistent point-in-time view of all entries.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|e| MetricSample {
                metric: e.metric,
                value: match &e.value {
                    EntryValue::Gauge(v) => MetricValue::Gauge(*v),
                    EntryValue::Enum { states, active } => MetricValue::State(states[*active]),
                },
                last_update: e.last_update,
            })
            .collect()
    }

    /// Encode all entries in the Prometheus text exposition format. The
    /// lock is held only for the clone, not for the formatting.
    pub fn render(&self) -> String {
        let entries: Vec<Entry> = self.entries.read().unwrap().clone();

        let mut out = String::with_capacity(entries.len() * 96);
        for entry in &entries {
            let _ = writeln!(out, "# HELP {} {}", entry.metric, entry.help);
            let _ = writeln!(out, "# TYPE {} gauge", entry.metric);
            match &entry.value {
                EntryValue::Gauge(v) => {
                    let _ = writeln!(out, "{} {}", entry.metric, v);
                }
                EntryValue::Enum { states, active } => {
                    for (i, state) in states.iter().enumerate() {
                        let _ = writeln!(
                            out,
                            "{}{{{}=\"{}\"}} {}",
                            entry.metric,
                            entry.metric,
                            state,
                            u8::from(i == *active)
                        );
                    }
                }
            }
        }
        out
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(fields: &[(&'static str, FieldValue)]) -> DecodedRecord {
        let mut record = DecodedRecord::new();
        for (name, value) in fields {
            record.fields.insert(name, value.clone());
        }
        record
    }

    fn sample(registry: &MetricRegistry, metric: &str) -> MetricSample {
        registry
            .snapshot()
            .into_iter()
            .find(|s| s.metric == metric)
            .unwrap()
    }

    #[test]
    fn test_apply_updates_only_present_fields() {
        let registry = MetricRegistry::new();
        registry.apply(&record(&[(
            "CURRENT_ELECTRICITY_USAGE",
            FieldValue::Numeric {
                value: 0.244,
                unit: Some("kW".to_string()),
            },
        )]));

        let updated = sample(&registry, "current_elec_usage");
        assert_eq!(updated.value, MetricValue::Gauge(0.244));
        assert!(updated.last_update.is_some());

        let untouched = sample(&registry, "instant_voltage");
        assert_eq!(untouched.value, MetricValue::Gauge(0.0));
        assert!(untouched.last_update.is_none());
    }

    #[test]
    fn test_unmapped_fields_are_ignored() {
        let registry = MetricRegistry::new();
        registry.apply(&record(&[(
            "VOLTAGE_SAG_L2_COUNT",
            FieldValue::Numeric {
                value: 3.0,
                unit: None,
            },
        )]));

        for s in registry.snapshot() {
            assert!(s.last_update.is_none(), "{} was updated", s.metric);
        }
    }

    #[test]
    fn test_enum_transition_keeps_exactly_one_state_active() {
        let registry = MetricRegistry::new();
        assert_eq!(
            sample(&registry, "active_tariff").value,
            MetricValue::State("tarrif_1")
        );

        registry.apply(&record(&[(
            "ELECTRICITY_ACTIVE_TARIFF",
            FieldValue::State("tarrif_2"),
        )]));
        assert_eq!(
            sample(&registry, "active_tariff").value,
            MetricValue::State("tarrif_2")
        );

        let rendered = registry.render();
        assert!(rendered.contains("active_tariff{active_tariff=\"tarrif_1\"} 0"));
        assert!(rendered.contains("active_tariff{active_tariff=\"tarrif_2\"} 1"));
    }

    #[test]
    fn test_unknown_state_name_is_rejected() {
        let registry = MetricRegistry::new();
        registry.apply(&record(&[(
            "ELECTRICITY_ACTIVE_TARIFF",
            FieldValue::State("tarrif_9"),
        )]));

        // Still on the initial state, not on some phantom one.
        assert_eq!(
            sample(&registry, "active_tariff").value,
            MetricValue::State("tarrif_1")
        );
    }

    #[test]
    fn test_render_exposition_format() {
        let registry = MetricRegistry::new();
        registry.apply(&record(&[(
            "CURRENT_ELECTRICITY_USAGE",
            FieldValue::Numeric {
                value: 0.244,
                unit: Some("kW".to_string()),
            },
        )]));

        let rendered = registry.render();
        assert!(rendered.contains("# HELP current_elec_usage Current electricity usage (kW)"));
        assert!(rendered.contains("# TYPE current_elec_usage gauge"));
        assert!(rendered.contains("\ncurrent_elec_usage 0.244\n"));
    }

    #[test]
    fn test_concurrent_sampling_never_sees_mixed_states() {
        let registry = Arc::new(MetricRegistry::new());

        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    let state = if i % 2 == 0 { "tarrif_2" } else { "tarrif_1" };
                    registry.apply(&record(&[(
                        "ELECTRICITY_ACTIVE_TARIFF",
                        FieldValue::State(state),
                    )]));
                }
            })
        };

        for _ in 0..500 {
            let rendered = registry.render();
            let active = rendered
                .lines()
                .filter(|l| l.starts_with("active_tariff{") && l.ends_with(" 1"))
                .count();
            assert_eq!(active, 1, "expected exactly one active state:\n{}", rendered);
        }

        writer.join().unwrap();
    }
}
