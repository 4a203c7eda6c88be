//! # RYLR998 LoRa Modem Driver
//!
//! Drives a REYAX RYLR998 (or any modem speaking the same AT command set) over
//! a UART link.
//!
//! This module handles:
//! - Opening the serial port (auto-detecting the device if asked to)
//! - Link configuration via `AT+BAND` / `AT+PARAMETER`
//! - Parsing `+RCV=<addr>,<len>,<data>,<rssi>,<snr>` receptions, where
//!   `<data>` is raw binary and may itself contain `,` or `\r\n`
//! - Running the reader task that feeds each frame to the registered callback

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

use super::{FrameCallback, Radio, RadioSettings, ReceivedFrame};
use crate::config::SerialConfig;
use crate::error::{GatewayError, Result};

/// Factory default UART speed of the RYLR998
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Port setting that requests auto-detection
pub const AUTO_DETECT_PORT: &str = "auto";

/// Device paths tried by auto-detection (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters
    "/dev/ttyACM0", // USB CDC devices
    "/dev/serial0", // Raspberry Pi header UART
];

/// Prefix of an unsolicited reception report
const RCV_PREFIX: &[u8] = b"+RCV=";

/// Largest payload the modem reports in one `+RCV`
pub const MAX_RCV_PAYLOAD: usize = 240;

/// Initial capacity of the receive accumulator
const RX_BUFFER_CAPACITY: usize = 1024;

/// Event reported by the modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    /// `+OK`: last command accepted
    Ok,

    /// `+READY`: module (re)started
    Ready,

    /// `+ERR=<code>`: last command rejected
    Error(u16),

    /// `+RCV=...`: a frame arrived
    Received(Reception),

    /// Anything else, kept for logging
    Unknown(String),
}

/// A frame reported by `+RCV`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reception {
    /// Modem address of the sender
    pub address: u16,

    /// Frame bytes
    pub data: Bytes,

    /// Received signal strength in dBm
    pub rssi: i16,

    /// Signal-to-noise ratio in dB
    pub snr: i16,
}

/// Extract the next complete event from the receive accumulator
///
/// Consumes the bytes of the returned event. Returns `None` without consuming
/// anything (apart from blank line endings) while the next event is still
/// incomplete.
pub fn parse_event(buf: &mut BytesMut) -> Option<ModemEvent> {
    let blank = buf.iter().take_while(|&&b| b == b'\r' || b == b'\n').count();
    buf.advance(blank);

    if buf.is_empty() {
        return None;
    }

    if buf.starts_with(RCV_PREFIX) {
        return parse_reception(buf);
    }

    if buf.len() < RCV_PREFIX.len() && RCV_PREFIX.starts_with(&buf[..]) {
        return None;
    }

    let end = find_crlf(buf, 0)?;
    let line = buf.split_to(end + 2);
    let text = String::from_utf8_lossy(&line[..end]).trim().to_string();
    Some(parse_response(&text))
}

fn parse_response(text: &str) -> ModemEvent {
    match text {
        "+OK" => ModemEvent::Ok,
        "+READY" => ModemEvent::Ready,
        _ => match text.strip_prefix("+ERR=").and_then(|code| code.parse().ok()) {
            Some(code) => ModemEvent::Error(code),
            None => ModemEvent::Unknown(text.to_string()),
        },
    }
}

fn parse_reception(buf: &mut BytesMut) -> Option<ModemEvent> {
    let mut commas = buf
        .iter()
        .enumerate()
        .skip(RCV_PREFIX.len())
        .filter(|&(_, &b)| b == b',')
        .map(|(i, _)| i);
    let first = commas.next();
    let second = commas.next();

    // The address and length fields are ASCII, so a line ending before the
    // second comma means the report is broken
    let line_end = find_crlf(buf, 0);
    let (first, second) = match (first, second) {
        (Some(first), Some(second)) if line_end.map_or(true, |end| end > second) => {
            (first, second)
        }
        _ => return line_end.map(|end| discard(buf, end + 2)),
    };

    let address = match ascii_field::<u16>(&buf[RCV_PREFIX.len()..first]) {
        Some(address) => address,
        None => return Some(discard(buf, second + 1)),
    };
    let len = match ascii_field::<usize>(&buf[first + 1..second]) {
        Some(len) => len,
        None => return Some(discard(buf, second + 1)),
    };

    // A length the modem cannot produce is line noise: skip the report
    // instead of waiting for (or slicing) that many bytes
    let payload_start = second + 1;
    let payload_end = match payload_start.checked_add(len) {
        Some(end) if len <= MAX_RCV_PAYLOAD => end,
        _ => {
            let skip = find_crlf(buf, payload_start).map_or(payload_start, |end| end + 2);
            return Some(discard(buf, skip));
        }
    };
    if buf.len() < payload_end {
        return None;
    }

    let tail_end = find_crlf(buf, payload_end)?;
    let signal = std::str::from_utf8(&buf[payload_end..tail_end])
        .ok()
        .and_then(parse_signal);
    let (rssi, snr) = match signal {
        Some(signal) => signal,
        None => return Some(discard(buf, tail_end + 2)),
    };

    let report = buf.split_to(tail_end + 2).freeze();
    Some(ModemEvent::Received(Reception {
        address,
        data: report.slice(payload_start..payload_end),
        rssi,
        snr,
    }))
}

/// Parse the `,<rssi>,<snr>` trailer of a reception report
fn parse_signal(tail: &str) -> Option<(i16, i16)> {
    let mut fields = tail.strip_prefix(',')?.split(',');
    let rssi = fields.next()?.trim().parse().ok()?;
    let snr = fields.next()?.trim().parse().ok()?;
    Some((rssi, snr))
}

fn ascii_field<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|window| window == b"\r\n")
        .map(|position| position + from)
}

fn discard(buf: &mut BytesMut, len: usize) -> ModemEvent {
    let junk = buf.split_to(len);
    ModemEvent::Unknown(String::from_utf8_lossy(&junk).trim().to_string())
}

/// Map a bandwidth in Hz to the modem's `AT+PARAMETER` code
pub fn bandwidth_code(bandwidth_hz: u32) -> Result<u8> {
    match bandwidth_hz {
        125_000 => Ok(7),
        250_000 => Ok(8),
        500_000 => Ok(9),
        other => Err(GatewayError::Radio(format!(
            "unsupported bandwidth {} Hz (supported: 125000, 250000, 500000)",
            other
        ))),
    }
}

/// Build the `AT+PARAMETER` command for the given settings
///
/// # Errors
///
/// Returns error if any parameter is outside what the modem accepts
pub fn parameter_command(settings: &RadioSettings) -> Result<String> {
    if !(5..=11).contains(&settings.spreading_factor) {
        return Err(GatewayError::Radio(format!(
            "unsupported spreading factor {} (supported: 5-11)",
            settings.spreading_factor
        )));
    }

    if !(5..=8).contains(&settings.coding_rate_denominator) {
        return Err(GatewayError::Radio(format!(
            "unsupported coding rate 4/{} (supported: 4/5-4/8)",
            settings.coding_rate_denominator
        )));
    }

    if !(4..=24).contains(&settings.preamble_length) {
        return Err(GatewayError::Radio(format!(
            "unsupported preamble length {} (supported: 4-24)",
            settings.preamble_length
        )));
    }

    Ok(format!(
        "AT+PARAMETER={},{},{},{}",
        settings.spreading_factor,
        bandwidth_code(settings.bandwidth_hz)?,
        settings.coding_rate_denominator - 4,
        settings.preamble_length
    ))
}

/// RYLR998 modem handle
///
/// Owns both halves of the serial link until [`Radio::begin_listening`]
/// moves the read half into the background reader task.
pub struct Rylr998<P> {
    reader: Option<ReadHalf<P>>,
    writer: WriteHalf<P>,
    rx_buf: BytesMut,
    callback: Option<FrameCallback>,
    listener: Option<JoinHandle<()>>,
    response_timeout: Duration,
    device_path: String,
}

impl<P> std::fmt::Debug for Rylr998<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rylr998")
            .field("device_path", &self.device_path)
            .field("listening", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl Rylr998<tokio_serial::SerialStream> {
    /// Open the modem described by the serial configuration
    ///
    /// A port of `"auto"` tries the usual device paths in order.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use atmos_gateway::config::SerialConfig;
    /// use atmos_gateway::radio::rylr998::Rylr998;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let config = SerialConfig {
    ///         port: "/dev/ttyUSB0".to_string(),
    ///         baud_rate: 115_200,
    ///         timeout_ms: 1000,
    ///     };
    ///     let modem = Rylr998::open(&config)?;
    ///     println!("Modem at {}", modem.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);

        if config.port == AUTO_DETECT_PORT {
            Self::open_with_paths(DEFAULT_DEVICE_PATHS, config.baud_rate, timeout)
        } else {
            Self::open_with_paths(&[config.port.as_str()], config.baud_rate, timeout)
        }
    }

    /// Open the first device path that succeeds
    pub fn open_with_paths(paths: &[&str], baud_rate: u32, response_timeout: Duration) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened LoRa modem at {} ({} baud)", path, baud_rate);
                    return Ok(Self::new(port, *path, response_timeout));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(GatewayError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| GatewayError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

impl<P> Rylr998<P>
where
    P: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap an already open byte stream to the modem
    pub fn new(port: P, device_path: impl Into<String>, response_timeout: Duration) -> Self {
        let (reader, writer) = tokio::io::split(port);
        Self {
            reader: Some(reader),
            writer,
            rx_buf: BytesMut::with_capacity(RX_BUFFER_CAPACITY),
            callback: None,
            listener: None,
            response_timeout,
            device_path: device_path.into(),
        }
    }

    /// Path of the serial device
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Send one AT command and wait for `+OK`
    ///
    /// # Errors
    ///
    /// Returns error on `+ERR`, on timeout, or if the link fails
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        debug!("Sending AT command: {}", command);

        self.writer
            .write_all(command.as_bytes())
            .await
            .map_err(|e| GatewayError::Serial(format!("Failed to write command: {}", e)))?;
        self.writer
            .write_all(b"\r\n")
            .await
            .map_err(|e| GatewayError::Serial(format!("Failed to write command: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| GatewayError::Serial(format!("Failed to flush serial port: {}", e)))?;

        let limit = self.response_timeout;
        match tokio::time::timeout(limit, self.await_ack(command)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Radio(format!(
                "no response to {} within {} ms",
                command,
                limit.as_millis()
            ))),
        }
    }

    async fn await_ack(&mut self, command: &str) -> Result<()> {
        loop {
            match self.next_event().await? {
                ModemEvent::Ok => return Ok(()),
                ModemEvent::Error(code) => {
                    return Err(GatewayError::Radio(format!(
                        "modem rejected {} (+ERR={})",
                        command, code
                    )))
                }
                other => debug!("Ignoring modem event while waiting for +OK: {:?}", other),
            }
        }
    }

    async fn next_event(&mut self) -> Result<ModemEvent> {
        loop {
            if let Some(event) = parse_event(&mut self.rx_buf) {
                return Ok(event);
            }

            let reader = self
                .reader
                .as_mut()
                .ok_or_else(|| GatewayError::Radio("modem is already listening".to_string()))?;
            if reader.read_buf(&mut self.rx_buf).await? == 0 {
                return Err(GatewayError::Radio("modem closed the serial link".to_string()));
            }
        }
    }
}

#[async_trait]
impl<P> Radio for Rylr998<P>
where
    P: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn configure(&mut self, settings: &RadioSettings) -> Result<()> {
        let parameters = parameter_command(settings)?;

        self.send_command("AT").await?;
        self.send_command(&format!("AT+BAND={}", settings.frequency_hz)).await?;
        self.send_command(&parameters).await?;

        info!(
            "LoRa modem configured: {} Hz, BW {} Hz, SF{}, CR 4/{}, preamble {}",
            settings.frequency_hz,
            settings.bandwidth_hz,
            settings.spreading_factor,
            settings.coding_rate_denominator,
            settings.preamble_length
        );
        Ok(())
    }

    fn on_frame_received(&mut self, callback: FrameCallback) {
        self.callback = Some(callback);
    }

    async fn begin_listening(&mut self) -> Result<()> {
        if self.callback.is_none() {
            return Err(GatewayError::Radio("no frame callback registered".to_string()));
        }

        // Transceiver mode (continuous receive between transmissions)
        self.send_command("AT+MODE=0").await?;

        let reader = self
            .reader
            .take()
            .ok_or_else(|| GatewayError::Radio("modem is already listening".to_string()))?;
        let callback = self
            .callback
            .take()
            .ok_or_else(|| GatewayError::Radio("no frame callback registered".to_string()))?;
        let pending = std::mem::take(&mut self.rx_buf);

        self.listener = Some(tokio::spawn(listen(reader, pending, callback)));
        info!("LoRa modem at {} listening", self.device_path);
        Ok(())
    }
}

impl<P> Drop for Rylr998<P> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Reader task: turn `+RCV` reports into callback invocations
async fn listen<R>(mut reader: R, mut buf: BytesMut, mut callback: FrameCallback)
where
    R: AsyncRead + Unpin,
{
    loop {
        while let Some(event) = parse_event(&mut buf) {
            match event {
                ModemEvent::Received(reception) => {
                    let len = reception.data.len();
                    debug!(
                        "Frame from modem address {} ({} bytes, RSSI {} dBm, SNR {} dB)",
                        reception.address, len, reception.rssi, reception.snr
                    );
                    let mut frame = ReceivedFrame::new(reception.data, reception.rssi);
                    callback(&mut frame, len);
                }
                ModemEvent::Error(code) => warn!("Modem reported +ERR={}", code),
                ModemEvent::Unknown(text) if text.starts_with("+RCV=") => {
                    warn!("Skipped malformed reception report: {:?}", text)
                }
                other => debug!("Ignoring modem event: {:?}", other),
            }
        }

        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                error!("LoRa modem closed the serial link, listener stopped");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Serial read failed, listener stopped: {}", e);
                return;
            }
        }
    }
}
