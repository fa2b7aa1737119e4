// src/io/bridge/websocket.rs
//
// WebSocket bridge transport. Text and binary messages are both treated as
// raw chunks; line framing is left to the frame decoder.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::io::error::LinkError;
use crate::io::traits::{stopped, Transport, TransportHandle};
use crate::io::types::{
    BridgeEndpoint, ChunkResult, LinkConfig, RawChunk, TransmitRequest, CHUNK_QUEUE_DEPTH,
    TRANSMIT_QUEUE_DEPTH,
};

/// `ws://` / `wss://` bridge
#[derive(Clone, Debug, Default)]
pub struct WsBridgeTransport;

#[async_trait]
impl Transport for WsBridgeTransport {
    fn kind(&self) -> &'static str {
        "ws"
    }

    async fn open(&self, config: &LinkConfig) -> Result<TransportHandle, LinkError> {
        let url = config
            .endpoint_url
            .as_deref()
            .ok_or_else(|| LinkError::InvalidConfig("bridge mode requires an endpoint URL".to_string()))?;
        if !matches!(BridgeEndpoint::parse(url)?, BridgeEndpoint::WebSocket(_)) {
            return Err(LinkError::InvalidConfig(format!("not a websocket endpoint: {}", url)));
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| LinkError::from_ws(url, &e))?;

        tlog!("[bridge:ws] Connected to {}", url);

        let (mut sink, mut stream) = ws_stream.split();

        let (chunk_tx, chunk_rx) = mpsc::channel::<ChunkResult>(CHUNK_QUEUE_DEPTH);
        let (transmit_tx, mut transmit_rx) = mpsc::channel::<TransmitRequest>(TRANSMIT_QUEUE_DEPTH);
        let (stop_tx, stop_rx) = watch::channel(false);

        // Read loop
        let device = url.to_string();
        let mut stop = stop_rx.clone();
        let read_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped(&mut stop) => break,
                    msg = stream.next() => {
                        let bytes = match msg {
                            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                            Some(Ok(Message::Binary(data))) => data.to_vec(),
                            Some(Ok(Message::Close(_))) | None => {
                                tlog!("[bridge:ws] {} closed by peer", device);
                                break;
                            }
                            Some(Ok(_)) => continue, // ping/pong/frame
                            Some(Err(e)) => {
                                let err = LinkError::from_ws(&device, &e);
                                tlog!("[bridge:ws] {} read failed: {}", device, err);
                                tokio::select! {
                                    _ = stopped(&mut stop) => {}
                                    _ = chunk_tx.send(Err(err)) => {}
                                }
                                break;
                            }
                        };
                        if bytes.is_empty() {
                            continue;
                        }
                        tokio::select! {
                            _ = stopped(&mut stop) => break,
                            sent = chunk_tx.send(Ok(RawChunk::new(bytes))) => if sent.is_err() { break },
                        }
                    }
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
                        let msg = match String::from_utf8(req.data) {
                            Ok(text) => Message::text(text),
                            Err(e) => Message::binary(e.into_bytes()),
                        };
                        let result = sink
                            .send(msg)
                            .await
                            .map_err(|e| LinkError::from_ws(&device, &e));
                        let _ = req.result_tx.send(result);
                    }
                }
            }
            let _ = sink.close().await;
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
