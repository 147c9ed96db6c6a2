//! Serial port settings for the P1 interface.
//!
//! Line parameters are fixed per DSMR version, so they ship as presets
//! rather than individual CLI knobs.

use super::DsmrError;
use std::io;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl SerialSettings {
    /// DSMR 2.2 / 3: 9600 baud, 7E1.
    pub const fn v2_2() -> Self {
        SerialSettings {
            baud_rate: 9600,
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::One,
        }
    }

    /// DSMR 4: 115200 baud, 8N1.
    pub const fn v4() -> Self {
        SerialSettings {
            baud_rate: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }

    /// DSMR 5 uses the same line parameters as DSMR 4.
    pub const fn v5() -> Self {
        Self::v4()
    }
}

/// Open the P1 device read-only for our purposes (the protocol has no write
/// path; we simply never write).
pub fn open(device: &str, settings: &SerialSettings) -> Result<SerialStream, DsmrError> {
    tokio_serial::new(device, settings.baud_rate)
        .data_bits(settings.data_bits)
        .parity(settings.parity)
        .stop_bits(settings.stop_bits)
        .open_native_async()
        .map_err(|e| {
            DsmrError::Stream(io::Error::new(
                io::ErrorKind::Other,
                format!("cannot open serial device {}: {}", device, e),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let v5 = SerialSettings::v5();
        assert_eq!(v5.baud_rate, 115200);
        assert_eq!(v5.data_bits, DataBits::Eight);
        assert_eq!(v5.parity, Parity::None);

        let v2 = SerialSettings::v2_2();
        assert_eq!(v2.baud_rate, 9600);
        assert_eq!(v2.data_bits, DataBits::Seven);
        assert_eq!(v2.parity, Parity::Even);
    }
}
