// src/io/error.rs
//
// Typed errors for the hardware link. Transport failures (permission, device,
// network) feed the reconnect loop; contract violations (busy handle, not
// connected, already connected) are returned to the caller.

use thiserror::Error;

/// Errors produced by transports, the frame decoder and the session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    /// The OS refused access to the device or socket.
    #[error("{device}: permission denied ({detail})")]
    PermissionDenied { device: String, detail: String },

    /// The device is missing, unplugged, or already claimed.
    #[error("{device}: device unavailable ({detail})")]
    DeviceUnavailable { device: String, detail: String },

    /// The bridge endpoint could not be reached.
    #[error("{device}: network unreachable ({detail})")]
    NetworkUnreachable { device: String, detail: String },

    /// A second reader was attached to a handle before the first was released.
    #[error("transport handle already has a reader attached")]
    HandleBusy,

    /// The operation needs an open link.
    #[error("not connected")]
    NotConnected,

    /// A connection is already being established or is open.
    #[error("already connected")]
    AlreadyConnected,

    /// The decode buffer overflowed without a line terminator.
    #[error("malformed frame: {discarded} bytes without a line terminator were discarded")]
    MalformedFrame { discarded: usize },

    /// Settings or connect options are not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O failure on an open link (read/write error, peer gone).
    #[error("{device}: {detail}")]
    Transport { device: String, detail: String },
}

impl LinkError {
    pub fn permission_denied(device: &str, detail: impl Into<String>) -> Self {
        LinkError::PermissionDenied {
            device: device.to_string(),
            detail: detail.into(),
        }
    }

    pub fn device_unavailable(device: &str, detail: impl Into<String>) -> Self {
        LinkError::DeviceUnavailable {
            device: device.to_string(),
            detail: detail.into(),
        }
    }

    pub fn network_unreachable(device: &str, detail: impl Into<String>) -> Self {
        LinkError::NetworkUnreachable {
            device: device.to_string(),
            detail: detail.into(),
        }
    }

    pub fn transport(device: &str, detail: impl Into<String>) -> Self {
        LinkError::Transport {
            device: device.to_string(),
            detail: detail.into(),
        }
    }

    /// Map a std I/O error onto the taxonomy.
    pub fn from_io(device: &str, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::PermissionDenied => LinkError::permission_denied(device, err.to_string()),
            ErrorKind::NotFound => LinkError::device_unavailable(device, err.to_string()),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::AddrNotAvailable
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
            | ErrorKind::TimedOut => LinkError::network_unreachable(device, err.to_string()),
            _ => LinkError::transport(device, err.to_string()),
        }
    }

    /// Map a WebSocket client error onto the taxonomy.
    pub fn from_ws(device: &str, err: &tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Io(e) => LinkError::from_io(device, e),
            WsError::Url(e) => LinkError::InvalidConfig(format!("{}: {}", device, e)),
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                LinkError::transport(device, "connection closed")
            }
            other => LinkError::network_unreachable(device, other.to_string()),
        }
    }

    /// True for failures that terminate a connect attempt or an open link and
    /// are recovered by the automatic retry path.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            LinkError::PermissionDenied { .. }
                | LinkError::DeviceUnavailable { .. }
                | LinkError::NetworkUnreachable { .. }
                | LinkError::Transport { .. }
        )
    }
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
impl LinkError {
    /// Map a serialport open error onto the taxonomy.
    pub fn from_serialport(device: &str, err: &serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => LinkError::device_unavailable(device, err.to_string()),
            serialport::ErrorKind::InvalidInput => {
                LinkError::InvalidConfig(format!("{}: {}", device, err))
            }
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                LinkError::permission_denied(device, err.to_string())
            }
            serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                LinkError::device_unavailable(device, err.to_string())
            }
            _ => LinkError::device_unavailable(device, err.to_string()),
        }
    }
}

impl From<LinkError> for String {
    fn from(err: LinkError) -> String {
        err.to_string()
    }
}
