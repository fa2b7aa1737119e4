// src/io/bridge/mod.rs
//
// Socket transports to a local bridge process that relays the serial link.
// The endpoint scheme selects the flavour: ws:// and wss:// use WebSocket,
// tcp:// uses a raw TCP stream. Both deliver the relayed bytes as raw chunks.

mod tcp;
mod websocket;

use async_trait::async_trait;

use crate::io::error::LinkError;
use crate::io::traits::{Transport, TransportHandle};
use crate::io::types::{BridgeEndpoint, LinkConfig};

pub use tcp::TcpBridgeTransport;
pub use websocket::WsBridgeTransport;

/// Bridge transport that dispatches on the endpoint scheme
#[derive(Clone, Debug, Default)]
pub struct BridgeTransport;

impl BridgeTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    fn kind(&self) -> &'static str {
        "bridge"
    }

    async fn open(&self, config: &LinkConfig) -> Result<TransportHandle, LinkError> {
        config.validate()?;
        let url = config
            .endpoint_url
            .as_deref()
            .ok_or_else(|| LinkError::InvalidConfig("bridge mode requires an endpoint URL".to_string()))?;

        match BridgeEndpoint::parse(url)? {
            BridgeEndpoint::WebSocket(_) => WsBridgeTransport.open(config).await,
            BridgeEndpoint::Tcp { .. } => TcpBridgeTransport.open(config).await,
        }
    }
}
