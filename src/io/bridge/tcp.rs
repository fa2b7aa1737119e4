// src/io/bridge/tcp.rs
//
// Raw TCP bridge transport. The bridge relays serial bytes verbatim.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::io::error::LinkError;
use crate::io::traits::{stopped, Transport, TransportHandle};
use crate::io::types::{
    BridgeEndpoint, ChunkResult, LinkConfig, RawChunk, TransmitRequest, CHUNK_QUEUE_DEPTH,
    TRANSMIT_QUEUE_DEPTH,
};

/// `tcp://host:port` bridge
#[derive(Clone, Debug, Default)]
pub struct TcpBridgeTransport;

#[async_trait]
impl Transport for TcpBridgeTransport {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    async fn open(&self, config: &LinkConfig) -> Result<TransportHandle, LinkError> {
        let url = config
            .endpoint_url
            .as_deref()
            .ok_or_else(|| LinkError::InvalidConfig("bridge mode requires an endpoint URL".to_string()))?;
        let (host, port) = match BridgeEndpoint::parse(url)? {
            BridgeEndpoint::Tcp { host, port } => (host, port),
            BridgeEndpoint::WebSocket(_) => {
                return Err(LinkError::InvalidConfig(format!("not a tcp endpoint: {}", url)))
            }
        };

        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| LinkError::from_io(url, &e))?;
        let _ = stream.set_nodelay(true);

        tlog!("[bridge:tcp] Connected to {}:{}", host, port);

        // Split into read/write halves
        let (mut read_half, mut write_half) = stream.into_split();

        let (chunk_tx, chunk_rx) = mpsc::channel::<ChunkResult>(CHUNK_QUEUE_DEPTH);
        let (transmit_tx, mut transmit_rx) = mpsc::channel::<TransmitRequest>(TRANSMIT_QUEUE_DEPTH);
        let (stop_tx, stop_rx) = watch::channel(false);

        // Read loop
        let device = url.to_string();
        let mut stop = stop_rx.clone();
        let read_task = tokio::spawn(async move {
            let mut read_buf = [0u8; 2048];
            loop {
                tokio::select! {
                    _ = stopped(&mut stop) => break,
                    res = read_half.read(&mut read_buf) => match res {
                        Ok(0) => {
                            tlog!("[bridge:tcp] {} closed by peer", device);
                            break;
                        }
                        Ok(n) => {
                            let chunk = RawChunk::new(read_buf[..n].to_vec());
                            tokio::select! {
                                _ = stopped(&mut stop) => break,
                                sent = chunk_tx.send(Ok(chunk)) => if sent.is_err() { break },
                            }
                        }
                        Err(e) => {
                            let err = LinkError::from_io(&device, &e);
                            tlog!("[bridge:tcp] {} read failed: {}", device, err);
                            tokio::select! {
                                _ = stopped(&mut stop) => {}
                                _ = chunk_tx.send(Err(err)) => {}
                            }
                            break;
                        }
                    },
                }
            }
        });

        // Transmit loop
        let device = url.to_string();
        let mut stop = stop_rx;
        let write_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped(&mut stop) => break,
                    req = transmit_rx.recv() => {
                        let Some(req) = req else { break };
                        let result = match write_half.write_all(&req.data).await {
                            Ok(()) => write_half.flush().await,
                            Err(e) => Err(e),
                        }
                        .map_err(|e| LinkError::from_io(&device, &e));
                        let _ = req.result_tx.send(result);
                    }
                }
            }
            let _ = write_half.shutdown().await;
        });

        Ok(TransportHandle::new(
            url,
            chunk_rx,
            transmit_tx,
            stop_tx,
            vec![read_task, write_task],
        ))
    }
}
