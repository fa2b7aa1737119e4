// src/io/mod.rs
//
// Transport layer for the hardware link.
// Provides a common interface over the physical channel (direct serial device
// or a socket to a bridge process) so the decoder, classifier and session are
// identical regardless of which transport is plugged in.

// Core modules
mod error;
pub mod traits; // Transport trait, TransportHandle, ChunkReader
mod types;

// Drivers
pub mod bridge; // WebSocket / TCP bridge
pub mod channel; // In-process transport for simulation and tests
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub mod serial; // Direct serial device

// Error types
pub use error::LinkError;

pub use traits::{ChunkReader, Transport, TransportHandle};
pub use types::{
    BridgeEndpoint, ChunkResult, LinkConfig, Parity, RawChunk, TransmitRequest, TransmitSender,
    TransportMode, DEFAULT_BAUD_RATE,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current time in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Lifecycle state of the link
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Closing => "closing",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the transport for a connect request.
pub fn transport_for(config: &LinkConfig) -> Result<Arc<dyn Transport>, LinkError> {
    config.validate()?;
    match config.mode {
        TransportMode::Bridge => Ok(Arc::new(bridge::BridgeTransport::new())),
        #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
        TransportMode::Device => Ok(Arc::new(serial::SerialTransport::new())),
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        TransportMode::Device => Err(LinkError::device_unavailable(
            "serial",
            "serial devices are not supported on this platform",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_for_mode() {
        let t = transport_for(&LinkConfig::bridge("tcp://127.0.0.1:7000")).unwrap();
        assert_eq!(t.kind(), "bridge");

        let t = transport_for(&LinkConfig::device(9600)).unwrap();
        assert_eq!(t.kind(), "serial");

        assert!(transport_for(&LinkConfig::bridge("ftp://nowhere")).is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LinkState::Connected.to_string(), "connected");
        assert_eq!(
            serde_json::to_string(&LinkState::Closing).unwrap(),
            "\"closing\""
        );
    }
}
