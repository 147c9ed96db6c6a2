//! DSMR P1 ingestion: frame reading, telegram decoding and the loop that
//! drives both into the metric registry.

use crate::metrics::MetricRegistry;
use log::{debug, error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::watch;

pub mod obis_parser;
pub mod parser;
pub mod reader;
pub mod serial;
pub mod structs;
pub mod telegram_spec;

use reader::TelegramReader;
use telegram_spec::TelegramSpec;

#[derive(Error, Debug)]
pub enum DsmrError {
    /// Malformed or incomplete frame boundary. Recoverable: skip to the
    /// next frame.
    #[error("framing error: {0}")]
    Framing(String),

    /// Frame boundaries found but the CRC16 does not match. Recoverable:
    /// discard the telegram.
    #[error("checksum mismatch: telegram carries {expected:04X}, computed {calculated:04X}")]
    Checksum { expected: u16, calculated: u16 },

    /// A known OBIS code carried a value that does not decode per its
    /// declared type. Recoverable: discard the telegram.
    #[error("field {obis} has undecodable value '{value}': {reason}")]
    FieldDecode {
        obis: String,
        value: String,
        reason: String,
    },

    /// Device-level I/O failure. Not recoverable here; the surrounding
    /// process decides whether to terminate or reconnect.
    #[error("serial stream error: {0}")]
    Stream(#[from] std::io::Error),
}

impl DsmrError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DsmrError::Stream(_))
    }
}

/// Drives read -> decode -> apply for the lifetime of the process.
///
/// Per-telegram errors are contained here: they are logged and the loop
/// moves on to the next frame. Only stream-level failures escape `run`.
pub struct DsmrManager {
    registry: Arc<MetricRegistry>,
    spec: &'static TelegramSpec,
    shutdown: watch::Receiver<bool>,
}

impl DsmrManager {
    pub fn new(
        registry: Arc<MetricRegistry>,
        spec: &'static TelegramSpec,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        DsmrManager {
            registry,
            spec,
            shutdown,
        }
    }

    /// Returns `Ok(())` only on cancellation; a fatal stream error is
    /// returned to the caller. Cancellation is checked once per cycle.
    pub async fn run<R: AsyncRead + Unpin>(
        mut self,
        reader: &mut TelegramReader<R>,
    ) -> Result<(), DsmrError> {
        info!("Starting DSMR ingestion ({} field layout)", self.spec.version);

        loop {
            if *self.shutdown.borrow() {
                info!("DSMR ingestion stopping");
                return Ok(());
            }

            let next = tokio::select! {
                _ = self.shutdown.changed() => {
                    info!("DSMR ingestion stopping");
                    return Ok(());
                }
                next = reader.next_telegram() => next,
            };

            match next {
                Ok(telegram) => match parser::decode(&telegram, self.spec) {
                    Ok(record) => {
                        self.registry.apply(&record);
                        debug!(
                            "telegram from {} applied, {} fields",
                            telegram.identification,
                            record.len()
                        );
                    }
                    Err(e) => {
                        // Registry untouched; the whole telegram is dropped.
                        error!("telegram discarded: {}", e);
                    }
                },
                Err(e) if e.is_recoverable() => {
                    warn!("frame discarded: {}", e);
                }
                Err(e) => {
                    error!("serial stream failed: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricValue;
    use crc16::{State, ARC};

    fn p1_frame(body: &str) -> Vec<u8> {
        let mut text = String::from("/XMX5LGBBFG1009089532\r\n\r\n");
        text.push_str(body);
        text.push('!');
        let mut state = State::<ARC>::new();
        state.update(text.as_bytes());
        format!("{}{:04X}\r\n", text, state.get()).into_bytes()
    }

    fn gauge(registry: &MetricRegistry, metric: &str) -> f64 {
        match registry
            .snapshot()
            .into_iter()
            .find(|s| s.metric == metric)
            .unwrap()
            .value
        {
            MetricValue::Gauge(v) => v,
            other => panic!("{} is not a gauge: {:?}", metric, other),
        }
    }

    #[tokio::test]
    async fn test_corrupted_telegram_does_not_stop_the_loop() {
        let mut bytes = p1_frame("1-0:1.7.0(00.100*kW)\r\n1-0:1.8.1(000042.000*kWh)\r\n");
        let mut corrupt = p1_frame("1-0:1.7.0(00.200*kW)\r\n");
        let idx = corrupt.iter().position(|&b| b == b'2').unwrap();
        corrupt[idx] = b'9';
        bytes.extend(corrupt);
        bytes.extend(p1_frame("1-0:1.7.0(00.300*kW)\r\n"));

        let registry = Arc::new(MetricRegistry::new());
        let (_tx, rx) = watch::channel(false);
        let manager = DsmrManager::new(registry.clone(), &telegram_spec::V5, rx);

        let mut reader = TelegramReader::new(&bytes[..]);
        // Stream runs dry after the third frame; that ends the run.
        let result = manager.run(&mut reader).await;
        assert!(result.is_err());

        // First and third telegrams applied, the corrupted one skipped.
        assert_eq!(gauge(&registry, "current_elec_usage"), 0.3);
        assert_eq!(gauge(&registry, "tariff_1_elec"), 42.0);
    }

    #[tokio::test]
    async fn test_field_decode_error_leaves_registry_unchanged() {
        let bytes = p1_frame("1-0:1.8.1(000042.000*kWh)\r\n1-0:1.7.0(garbage*kW)\r\n");

        let registry = Arc::new(MetricRegistry::new());
        let (_tx, rx) = watch::channel(false);
        let manager = DsmrManager::new(registry.clone(), &telegram_spec::V5, rx);

        let mut reader = TelegramReader::new(&bytes[..]);
        let _ = manager.run(&mut reader).await;

        // The valid line came first, but the telegram failed as a whole.
        assert_eq!(gauge(&registry, "tariff_1_elec"), 0.0);
        assert_eq!(gauge(&registry, "current_elec_usage"), 0.0);
    }

    #[tokio::test]
    async fn test_shutdown_signal_ends_the_loop() {
        let (client, _server) = tokio::io::duplex(64);
        let registry = Arc::new(MetricRegistry::new());
        let (tx, rx) = watch::channel(false);
        let manager = DsmrManager::new(registry, &telegram_spec::V5, rx);

        let task = tokio::spawn(async move {
            let mut reader = TelegramReader::new(client);
            manager.run(&mut reader).await
        });

        tx.send(true).unwrap();
        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
