// src/io/serial/reader.rs
//
// Serial device transport.
// Opens the port, then runs blocking serial I/O on a dedicated thread that
// forwards chunks to the handle's reader and services transmit requests.

use async_trait::async_trait;
use serde::Serialize;
use std::io::{Read, Write};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use super::utils::{frame_format, with_frame};
use crate::io::error::LinkError;
use crate::io::traits::{blocking_deliver, Transport, TransportHandle};
use crate::io::types::{
    ChunkResult, LinkConfig, RawChunk, TransmitRequest, CHUNK_QUEUE_DEPTH, TRANSMIT_QUEUE_DEPTH,
};

/// Read timeout for the blocking loop. Bounds how long a stop request waits.
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

// ============================================================================
// Serial Transport
// ============================================================================

/// Direct serial link to the device
#[derive(Clone, Debug, Default)]
pub struct SerialTransport;

impl SerialTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> &'static str {
        "serial"
    }

    async fn open(&self, config: &LinkConfig) -> Result<TransportHandle, LinkError> {
        config.validate()?;

        let requested = config.port.clone();
        let baud_rate = config.effective_baud_rate();
        let data_bits = config.data_bits;
        let stop_bits = config.stop_bits;
        let parity = config.parity;

        // Port enumeration and open both block
        let label = requested.clone().unwrap_or_else(|| "serial".to_string());
        let (port_name, port) = tokio::task::spawn_blocking(move || {
            let port_name = match requested {
                Some(p) => p,
                None => choose_port()?,
            };
            let builder = serialport::new(&port_name, baud_rate).timeout(READ_POLL_TIMEOUT);
            let port = with_frame(builder, data_bits, parity, stop_bits)
                .open()
                .map_err(|e| LinkError::from_serialport(&port_name, &e))?;
            Ok::<_, LinkError>((port_name, port))
        })
        .await
        .map_err(|e| LinkError::device_unavailable(&label, format!("open task failed: {}", e)))??;

        tlog!(
            "[serial] Opened {} at {} baud ({})",
            port_name,
            baud_rate,
            frame_format(data_bits, parity, stop_bits)
        );

        let (chunk_tx, chunk_rx) = mpsc::channel::<ChunkResult>(CHUNK_QUEUE_DEPTH);
        let (transmit_tx, transmit_rx) = mpsc::channel::<TransmitRequest>(TRANSMIT_QUEUE_DEPTH);
        let (stop_tx, stop_rx) = watch::channel(false);

        let device = port_name.clone();
        let task = tokio::task::spawn_blocking(move || {
            run_serial_blocking(device, port, chunk_tx, transmit_rx, stop_rx)
        });

        Ok(TransportHandle::new(
            port_name,
            chunk_rx,
            transmit_tx,
            stop_tx,
            vec![task],
        ))
    }
}

/// Blocking serial loop. Exits on stop request, EOF, or read error; the port
/// is dropped (released) on return.
fn run_serial_blocking(
    device: String,
    mut port: Box<dyn serialport::SerialPort>,
    chunk_tx: mpsc::Sender<ChunkResult>,
    mut transmit_rx: mpsc::Receiver<TransmitRequest>,
    stop_rx: watch::Receiver<bool>,
) {
    let mut buf = [0u8; 256];
    let reason;

    loop {
        if *stop_rx.borrow() {
            reason = "stopped";
            break;
        }

        // Process pending transmit requests (non-blocking)
        while let Ok(req) = transmit_rx.try_recv() {
            let result = port
                .write_all(&req.data)
                .and_then(|_| port.flush())
                .map_err(|e| LinkError::from_io(&device, &e));
            let _ = req.result_tx.send(result);
        }

        match port.read(&mut buf) {
            Ok(n) if n > 0 => {
                let chunk = RawChunk::new(buf[..n].to_vec());
                if !blocking_deliver(&chunk_tx, &stop_rx, Ok(chunk)) {
                    reason = "stopped";
                    break;
                }
            }
            Ok(_) => {
                // EOF - port closed/disconnected
                reason = "disconnected";
                break;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // Timeout is expected for serial reads
            }
            Err(e) => {
                let err = LinkError::from_io(&device, &e);
                let _ = blocking_deliver(&chunk_tx, &stop_rx, Err(err));
                reason = "error";
                break;
            }
        }
    }

    // Fail anything still queued so callers don't wait on a dead port
    transmit_rx.close();
    while let Ok(req) = transmit_rx.try_recv() {
        let _ = req.result_tx.send(Err(LinkError::NotConnected));
    }

    tlog!("[serial] {} closed ({})", device, reason);
}

// ============================================================================
// Port Discovery
// ============================================================================

/// Pick a port when none is configured: first USB port, else the first port.
pub fn choose_port() -> Result<String, LinkError> {
    let ports = list_serial_ports()?;
    pick_port(&ports).ok_or_else(|| LinkError::device_unavailable("<auto>", "no serial ports found"))
}

fn pick_port(ports: &[SerialPortInfo]) -> Option<String> {
    ports
        .iter()
        .find(|p| p.port_type == "USB")
        .or_else(|| ports.first())
        .map(|p| p.port_name.clone())
}

/// Ports a link can be opened on, in enumeration order.
/// macOS lists each device twice; only the `/dev/cu.*` side is kept since
/// opening `/dev/tty.*` waits for carrier detect.
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, LinkError> {
    let ports = serialport::available_ports()
        .map_err(|e| LinkError::device_unavailable("<auto>", format!("failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|p| is_dial_out(&p.port_name))
        .map(SerialPortInfo::from)
        .collect())
}

#[cfg(target_os = "macos")]
fn is_dial_out(port_name: &str) -> bool {
    !port_name.starts_with("/dev/tty.")
}

#[cfg(not(target_os = "macos"))]
fn is_dial_out(_port_name: &str) -> bool {
    true
}

impl From<serialport::SerialPortInfo> for SerialPortInfo {
    fn from(p: serialport::SerialPortInfo) -> Self {
        let mut info = SerialPortInfo {
            port_name: p.port_name,
            port_type: String::new(),
            manufacturer: None,
            product: None,
            serial_number: None,
            vid: None,
            pid: None,
        };
        info.port_type = match p.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                info.manufacturer = usb.manufacturer;
                info.product = usb.product;
                info.serial_number = usb.serial_number;
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
                "USB"
            }
            serialport::SerialPortType::BluetoothPort => "Bluetooth",
            serialport::SerialPortType::PciPort => "PCI",
            serialport::SerialPortType::Unknown => "Unknown",
        }
        .to_string();
        info
    }
}
