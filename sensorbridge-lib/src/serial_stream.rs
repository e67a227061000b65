use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Deserialize;
use serialport::{DataBits, Parity, StopBits};
use thiserror::Error;

use crate::context::{Context, LinkState};
use crate::formatter::format_record;
use crate::message::Record;
use crate::parser::{Fallback, parse_line};

/// Errors that terminate the ingestion loop.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParityMode {
    #[default]
    None,
    Odd,
    Even,
}

impl From<ParityMode> for Parity {
    fn from(mode: ParityMode) -> Self {
        match mode {
            ParityMode::None => Parity::None,
            ParityMode::Odd => Parity::Odd,
            ParityMode::Even => Parity::Even,
        }
    }
}

/// Serial link parameters, typically deserialized from the config file.
#[derive(Clone, Debug, Deserialize)]
pub struct SerialSettings {
    pub port: String,
    pub baudrate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: ParityMode,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    100
}

fn data_bits(n: u8) -> DataBits {
    match n {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn stop_bits(n: u8) -> StopBits {
    match n {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

/// Blocking serial ingestion loop: open the port, then parse, format, and
/// broadcast each complete line, in arrival order, until `shutdown` is set.
///
/// Run this under `tokio::task::spawn_blocking`. Reads use a short timeout,
/// which doubles as the poll interval for the shutdown flag, so the loop
/// neither spins nor blocks the runtime. A failed open is fatal: one `error`
/// record goes out to subscribers and the loop ends without retrying.
pub fn run_serial_and_stream(
    ctx: Context,
    settings: &SerialSettings,
    shutdown: Arc<AtomicBool>,
) -> Result<(), LinkError> {
    ctx.set_link_state(LinkState::Connecting);
    info!(
        "Connecting to {} at {} baud...",
        settings.port, settings.baudrate
    );

    let mut port = match serialport::new(&settings.port, settings.baudrate)
        .data_bits(data_bits(settings.data_bits))
        .parity(settings.parity.into())
        .stop_bits(stop_bits(settings.stop_bits))
        .timeout(Duration::from_millis(settings.timeout_ms))
        .open()
    {
        Ok(port) => port,
        Err(e) => {
            error!("Serial open failed: {}", e);
            ctx.set_link_state(LinkState::Faulted);
            ctx.broadcaster().broadcast(&Record::Error {
                message: e.to_string(),
            });
            return Err(e.into());
        }
    };

    // Writer half for subscriber `send` commands.
    match port.try_clone() {
        Ok(writer) => ctx.attach_writer(writer),
        Err(e) => warn!("serial writer unavailable, send commands disabled: {}", e),
    }

    ctx.set_link_state(LinkState::Streaming);
    info!("Serial connected.");

    let mut buf = [0u8; 256];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    handle_line(&ctx, &line);
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // No bytes this interval; loop back around to the
                // shutdown check.
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                error!("Serial read failed: {}", e);
                ctx.set_link_state(LinkState::Faulted);
                ctx.detach_writer();
                ctx.broadcaster().broadcast(&Record::Error {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        }
    }

    ctx.set_link_state(LinkState::Closing);
    ctx.detach_writer();
    drop(port);
    ctx.set_link_state(LinkState::Disconnected);
    info!("Serial link closed.");
    Ok(())
}

/// One complete line: echo it to the local log, then parse → format →
/// broadcast. Unparseable lines stay out of the broadcast path.
fn handle_line(ctx: &Context, raw: &[u8]) {
    match std::str::from_utf8(raw) {
        Ok(text) if !text.trim().is_empty() => debug!("[SERIAL] {}", text.trim_end()),
        Ok(_) => {}
        Err(_) => debug!("[SERIAL] (binary) {}", hex(raw)),
    }

    if let Some(msg) = parse_line(raw, Fallback::LogRecord) {
        let record = format_record(ctx, msg);
        ctx.broadcaster().broadcast(&record);
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
