//! Serial command link to the booth controller board.
//!
//! The protocol is newline-terminated ASCII tokens, one per line. The board
//! sends `START` when the button is pressed; we send the countdown tokens,
//! `GO`, and `RESET` back. The link is noisy in practice, so malformed bytes
//! are discarded rather than surfaced.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use thiserror::Error;

/// Inbound token signalling a button press.
pub const START: &str = "START";
/// Outbound token that fires the capture lights.
pub const GO: &str = "GO";
/// Outbound token returning the board to its idle display.
pub const RESET: &str = "RESET";
/// Countdown tokens, in send order.
pub const COUNTDOWN: [&str; 3] = ["3", "2", "1"];

pub const DEFAULT_BAUD: u32 = 9600;

/// The board reboots when the host opens the port; it needs a moment
/// before it will accept commands.
const BOARD_RESET_SETTLE: Duration = Duration::from_secs(2);

/// Read timeout on the underlying port. Reads are only issued when bytes
/// are already waiting, so this never stalls a poll.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Errors that can occur on the serial link.
///
/// Only failure to open is fatal; everything after that degrades to
/// "no token this poll" or a logged warning.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial port '{port}': {source}")]
    OpenFailed {
        port: String,
        #[source]
        source: serialport::Error,
    },
}

/// A half-duplex line-oriented command channel.
///
/// Implemented by [`Transport`] for the real serial link; tests drive the
/// session controller with a scripted implementation instead.
pub trait CommandLink {
    /// Send a single-word command. Best-effort, never fails the caller.
    fn send(&mut self, command: &str);
    /// Return the next complete inbound token, if one is buffered.
    /// Must never block.
    fn poll(&mut self) -> Option<String>;
}

/// Accumulates raw serial bytes and splits them into lines.
///
/// Bytes arrive in arbitrary chunks; a token is only available once its
/// terminating newline has been seen.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pop the next complete line, decoded and trimmed.
    ///
    /// Returns `None` when no full line is buffered, when the line is not
    /// valid UTF-8 (the bytes are dropped), or when it is blank. One line
    /// is consumed per call, mirroring one token per poll.
    fn next_line(&mut self) -> Option<String> {
        let newline = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=newline).collect();
        match std::str::from_utf8(&line) {
            Ok(text) => {
                let token = text.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(_) => {
                log::debug!("Discarding undecodable serial line ({} bytes)", line.len());
                None
            }
        }
    }
}

/// The serial connection to the booth controller board.
pub struct Transport {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    buffer: LineBuffer,
}

impl Transport {
    /// Open the serial port and wait for the board to finish rebooting.
    ///
    /// This is the one startup step that is allowed to fail the process:
    /// without the link there is nothing for the booth to do.
    pub fn open(port_name: &str, baud: u32) -> Result<Self, TransportError> {
        let port = serialport::new(port_name, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| TransportError::OpenFailed {
                port: port_name.to_string(),
                source,
            })?;

        std::thread::sleep(BOARD_RESET_SETTLE);
        println!("Connected to controller on {} at {} baud", port_name, baud);

        Ok(Self {
            port: Some(port),
            port_name: port_name.to_string(),
            buffer: LineBuffer::default(),
        })
    }

    /// The port name this transport was opened on.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Write `command` followed by a newline. No acknowledgment is
    /// expected. Silently a no-op when the port is gone; write errors are
    /// logged and swallowed.
    pub fn send_command(&mut self, command: &str) {
        let Some(port) = self.port.as_mut() else {
            return;
        };
        let message = format!("{}\n", command);
        match port.write_all(message.as_bytes()) {
            Ok(()) => log::debug!("Sent: {}", command),
            Err(e) => log::warn!("Failed to send '{}': {}", command, e),
        }
    }

    /// Return a decoded, trimmed inbound line if one is fully buffered.
    ///
    /// Never blocks: bytes are only read when the port reports them
    /// waiting. Absence of data is the normal case, not a fault.
    pub fn receive_nonblocking(&mut self) -> Option<String> {
        let port = self.port.as_mut()?;

        let waiting = port.bytes_to_read().unwrap_or(0);
        if waiting > 0 {
            let mut chunk = vec![0u8; waiting as usize];
            match port.read(&mut chunk) {
                Ok(n) => self.buffer.push_bytes(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => log::warn!("Serial read error: {}", e),
            }
        }

        let token = self.buffer.next_line();
        if let Some(ref token) = token {
            log::debug!("Received: {}", token);
        }
        token
    }

    /// Send a best-effort `RESET` so the board is not left mid-countdown,
    /// then release the port.
    pub fn close(mut self) {
        self.send_command(RESET);
        if self.port.take().is_some() {
            println!("Disconnected from controller");
        }
    }
}

impl CommandLink for Transport {
    fn send(&mut self, command: &str) {
        self.send_command(command);
    }

    fn poll(&mut self) -> Option<String> {
        self.receive_nonblocking()
    }
}

/// Enumerate serial ports known to the OS, for `list-ports`.
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, serialport::Error> {
    serialport::available_ports()
}

/// Pick a default serial port for this OS.
///
/// On Unix-likes, scan `/dev` for the usual USB-serial names and take the
/// first match; the fallback covers the common Linux case. Windows boards
/// almost always enumerate as COM3.
#[cfg(unix)]
pub fn default_port() -> String {
    const USB_SERIAL_PREFIXES: [&str; 4] = ["ttyUSB", "ttyACM", "cu.usbserial", "cu.usbmodem"];

    let mut candidates: Vec<String> = std::fs::read_dir("/dev")
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| USB_SERIAL_PREFIXES.iter().any(|p| name.starts_with(p)))
                .collect()
        })
        .unwrap_or_default();
    candidates.sort();

    match candidates.first() {
        Some(name) => format!("/dev/{}", name),
        None => "/dev/ttyUSB0".to_string(),
    }
}

#[cfg(windows)]
pub fn default_port() -> String {
    "COM3".to_string()
}
