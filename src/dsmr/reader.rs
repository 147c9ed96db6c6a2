//! Frame reader: turns a raw byte stream from the P1 port into complete,
//! checksum-verified telegrams.
//!
//! Serial I/O delivers bytes in arbitrary chunks; reassembly happens here,
//! never in the caller. The reader keeps partially buffered bytes between
//! calls and carries no other state.

use super::structs::Telegram;
use super::DsmrError;
use crc16::{State, ARC};
use log::debug;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// Upper bound on the scan window. A real telegram is well under 2 KiB; if
/// this much accumulates without a complete frame, the stream is junk.
pub const MAX_TELEGRAM_SIZE: usize = 16 * 1024;

const READ_CHUNK: usize = 1024;

pub struct TelegramReader<R> {
    stream: R,
    buf: Vec<u8>,
    read_timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin> TelegramReader<R> {
    pub fn new(stream: R) -> Self {
        TelegramReader {
            stream,
            buf: Vec::new(),
            read_timeout: None,
        }
    }

    /// Like [`TelegramReader::new`], but a read that delivers nothing within
    /// `timeout` is treated as a dead device and reported as a fatal stream
    /// error. Meters transmit every 1-10 seconds, so anything beyond that
    /// means the line is silent.
    pub fn with_read_timeout(stream: R, timeout: Duration) -> Self {
        TelegramReader {
            stream,
            buf: Vec::new(),
            read_timeout: Some(timeout),
        }
    }

    /// Pull the next complete telegram off the stream.
    ///
    /// Recoverable outcomes (`Framing`, `Checksum`) leave the reader ready
    /// for the next call; `Stream` errors mean the device is gone.
    pub async fn next_telegram(&mut self) -> Result<Telegram, DsmrError> {
        loop {
            if let Some(telegram) = self.scan_buffer()? {
                return Ok(telegram);
            }
            self.fill().await?;
        }
    }

    /// Try to carve one telegram out of the buffer. `Ok(None)` means more
    /// bytes are needed.
    fn scan_buffer(&mut self) -> Result<Option<Telegram>, DsmrError> {
        // Drop line noise ahead of the start marker.
        match self.buf.iter().position(|&b| b == b'/') {
            Some(0) => {}
            Some(pos) => {
                debug!("discarding {} bytes before start of telegram", pos);
                self.buf.drain(..pos);
            }
            None => {
                if self.buf.len() > MAX_TELEGRAM_SIZE {
                    self.buf.clear();
                    return Err(DsmrError::Framing(
                        "no start of telegram within scan window".to_string(),
                    ));
                }
                return Ok(None);
            }
        }

        // End marker: '!' at the start of a line, followed by 4 hex digits.
        let mut bang = None;
        for i in 1..self.buf.len() {
            if self.buf[i] == b'!' && self.buf[i - 1] == b'\n' {
                bang = Some(i);
                break;
            }
        }

        let Some(bang) = bang else {
            if self.buf.len() > MAX_TELEGRAM_SIZE {
                self.buf.clear();
                return Err(DsmrError::Framing(
                    "telegram exceeds maximum size without end marker".to_string(),
                ));
            }
            return Ok(None);
        };

        if self.buf.len() < bang + 5 {
            // Checksum trailer not complete yet.
            return Ok(None);
        }

        let trailer = &self.buf[bang + 1..bang + 5];
        let expected = std::str::from_utf8(trailer)
            .ok()
            .and_then(|s| u16::from_str_radix(s, 16).ok());
        let Some(expected) = expected else {
            self.buf.drain(..bang + 5);
            return Err(DsmrError::Framing(
                "checksum trailer is not 4 hex digits".to_string(),
            ));
        };

        // CRC16 runs over everything from '/' through '!' inclusive.
        let mut state = State::<ARC>::new();
        state.update(&self.buf[..=bang]);
        let calculated = state.get();

        let text = String::from_utf8_lossy(&self.buf[..bang]).into_owned();

        // Consume the frame and its trailing line ending.
        let mut end = bang + 5;
        while end < self.buf.len() && (self.buf[end] == b'\r' || self.buf[end] == b'\n') {
            end += 1;
        }
        self.buf.drain(..end);

        if calculated != expected {
            return Err(DsmrError::Checksum {
                expected,
                calculated,
            });
        }

        let mut lines = text.lines().map(str::to_string);
        let identification = lines.next().unwrap_or_default();

        Ok(Some(Telegram {
            identification,
            lines: lines.collect(),
            checksum: expected,
        }))
    }

    async fn fill(&mut self) -> Result<(), DsmrError> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = match self.read_timeout {
            Some(limit) => match timeout(limit, self.stream.read(&mut chunk)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(DsmrError::Stream(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "no data from serial device within read timeout",
                    )))
                }
            },
            None => self.stream.read(&mut chunk).await?,
        };

        if n == 0 {
            if self.buf.is_empty() {
                return Err(DsmrError::Stream(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial stream closed",
                )));
            }
            let dropped = self.buf.len();
            self.buf.clear();
            return Err(DsmrError::Framing(format!(
                "stream closed mid-frame, {} bytes dropped",
                dropped
            )));
        }

        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}
