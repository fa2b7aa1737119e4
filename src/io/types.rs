// src/io/types.rs
//
// Shared types between transports and the session.
// Drivers push chunks to the reader and pull transmit requests from the session.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::error::LinkError;

// ============================================================================
// Link Configuration
// ============================================================================

/// Physical channel used to reach the hardware
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Direct serial link to the microcontroller
    #[default]
    Device,
    /// Socket to a local bridge process relaying the serial link
    Bridge,
}

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Options recognized by `Transport::open`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkConfig {
    #[serde(default)]
    pub mode: TransportMode,
    /// Device mode: baud rate (defaults to 9600)
    #[serde(default)]
    pub baud_rate: Option<u32>,
    /// Bridge mode: `ws://`, `wss://` or `tcp://` endpoint
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Device mode: explicit port path. `None` lets the transport choose.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
}

pub const DEFAULT_BAUD_RATE: u32 = 9600;

fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Device,
            baud_rate: None,
            endpoint_url: None,
            port: None,
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::None,
        }
    }
}

impl LinkConfig {
    /// Direct device link at the given baud rate.
    pub fn device(baud_rate: u32) -> Self {
        Self {
            mode: TransportMode::Device,
            baud_rate: Some(baud_rate),
            ..Self::default()
        }
    }

    /// Socket link to a bridge process.
    pub fn bridge(endpoint_url: impl Into<String>) -> Self {
        Self {
            mode: TransportMode::Bridge,
            endpoint_url: Some(endpoint_url.into()),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn effective_baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE)
    }

    /// Check the options are usable for the selected mode.
    pub fn validate(&self) -> Result<(), LinkError> {
        match self.mode {
            TransportMode::Device => {
                if self.effective_baud_rate() == 0 {
                    return Err(LinkError::InvalidConfig("baud rate must be non-zero".to_string()));
                }
                Ok(())
            }
            TransportMode::Bridge => {
                let url = self.endpoint_url.as_deref().ok_or_else(|| {
                    LinkError::InvalidConfig("bridge mode requires an endpoint URL".to_string())
                })?;
                BridgeEndpoint::parse(url).map(|_| ())
            }
        }
    }

    /// Human-readable device label used in logs and errors.
    pub fn describe(&self) -> String {
        match self.mode {
            TransportMode::Device => format!(
                "{} @ {} baud",
                self.port.as_deref().unwrap_or("<auto>"),
                self.effective_baud_rate()
            ),
            TransportMode::Bridge => self
                .endpoint_url
                .clone()
                .unwrap_or_else(|| "<no endpoint>".to_string()),
        }
    }
}

/// Parsed bridge endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeEndpoint {
    /// `ws://` or `wss://` URL, kept verbatim for the WebSocket client
    WebSocket(String),
    /// `tcp://host:port`
    Tcp { host: String, port: u16 },
}

impl BridgeEndpoint {
    pub fn parse(url: &str) -> Result<Self, LinkError> {
        let url = url.trim();
        if url.starts_with("ws://") || url.starts_with("wss://") {
            return Ok(BridgeEndpoint::WebSocket(url.to_string()));
        }
        if let Some(rest) = url.strip_prefix("tcp://") {
            let rest = rest.trim_end_matches('/');
            let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
                LinkError::InvalidConfig(format!("tcp endpoint needs host:port: {}", url))
            })?;
            let port: u16 = port
                .parse()
                .map_err(|_| LinkError::InvalidConfig(format!("invalid tcp port in {}", url)))?;
            if host.is_empty() {
                return Err(LinkError::InvalidConfig(format!("missing host in {}", url)));
            }
            let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
            return Ok(BridgeEndpoint::Tcp { host, port });
        }
        Err(LinkError::InvalidConfig(format!(
            "unsupported bridge endpoint (expected ws://, wss:// or tcp://): {}",
            url
        )))
    }
}

// ============================================================================
// Stream Items
// ============================================================================

/// Immutable fragment delivered by a transport
#[derive(Clone, Debug, PartialEq)]
pub struct RawChunk {
    pub bytes: Vec<u8>,
    /// Arrival time in microseconds since UNIX epoch
    pub timestamp_us: u64,
}

impl RawChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            timestamp_us: super::now_us(),
        }
    }
}

/// One item of a handle's read sequence. An `Err` is always the last item.
pub type ChunkResult = Result<RawChunk, LinkError>;

// ============================================================================
// Transmit Types
// ============================================================================

/// Transmit request sent to a transport's write side
pub struct TransmitRequest {
    /// Encoded bytes ready to send
    pub data: Vec<u8>,
    /// Oneshot channel to send the result back
    pub result_tx: oneshot::Sender<Result<(), LinkError>>,
}

/// Sender type for transmit requests
pub type TransmitSender = mpsc::Sender<TransmitRequest>;

/// Queue depth for transmit requests, per handle
pub const TRANSMIT_QUEUE_DEPTH: usize = 32;

/// Queue depth for chunks awaiting the reader, per handle
pub const CHUNK_QUEUE_DEPTH: usize = 64;
