// src/io/channel.rs
//
// In-process transport. Each `open` hands a fresh peer to the controller,
// which can push chunks, watch what the session writes, and drop the peer to
// simulate the hardware going away. Opens can be scripted to fail or to hang.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use crate::io::error::LinkError;
use crate::io::traits::{stopped, Transport, TransportHandle};
use crate::io::types::{ChunkResult, LinkConfig, RawChunk, TransmitRequest, CHUNK_QUEUE_DEPTH, TRANSMIT_QUEUE_DEPTH};

struct ChannelShared {
    failures: Mutex<VecDeque<LinkError>>,
    opens: AtomicUsize,
    hold: AtomicBool,
    peers_tx: mpsc::UnboundedSender<ChannelPeer>,
}

/// Transport whose far end is held by a `ChannelController`
#[derive(Clone)]
pub struct ChannelTransport {
    shared: Arc<ChannelShared>,
}

/// Test/simulation side of a `ChannelTransport`
pub struct ChannelController {
    shared: Arc<ChannelShared>,
    peers_rx: mpsc::UnboundedReceiver<ChannelPeer>,
}

/// Far end of one open channel link
pub struct ChannelPeer {
    chunks: mpsc::Sender<ChunkResult>,
    written: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new() -> (ChannelTransport, ChannelController) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ChannelShared {
            failures: Mutex::new(VecDeque::new()),
            opens: AtomicUsize::new(0),
            hold: AtomicBool::new(false),
            peers_tx,
        });
        (
            ChannelTransport {
                shared: shared.clone(),
            },
            ChannelController { shared, peers_rx },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn kind(&self) -> &'static str {
        "channel"
    }

    async fn open(&self, _config: &LinkConfig) -> Result<TransportHandle, LinkError> {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);

        if self.shared.hold.load(Ordering::SeqCst) {
            // Never completes; only dropping the future ends this open
            std::future::pending::<()>().await;
        }

        let scripted = self
            .shared
            .failures
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front());
        if let Some(err) = scripted {
            return Err(err);
        }

        let (peer_tx, mut peer_rx) = mpsc::channel::<ChunkResult>(CHUNK_QUEUE_DEPTH);
        let (written_tx, written_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (chunk_tx, chunk_rx) = mpsc::channel::<ChunkResult>(CHUNK_QUEUE_DEPTH);
        let (transmit_tx, mut transmit_rx) = mpsc::channel::<TransmitRequest>(TRANSMIT_QUEUE_DEPTH);
        let (stop_tx, stop_rx) = watch::channel(false);

        self.shared
            .peers_tx
            .send(ChannelPeer {
                chunks: peer_tx,
                written: written_rx,
            })
            .map_err(|_| LinkError::device_unavailable("channel", "controller dropped"))?;

        // Forward peer chunks to the reader until stopped or the peer goes away
        let mut stop = stop_rx.clone();
        let forward_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped(&mut stop) => break,
                    item = peer_rx.recv() => {
                        let Some(item) = item else { break };
                        let last = item.is_err();
                        tokio::select! {
                            _ = stopped(&mut stop) => break,
                            sent = chunk_tx.send(item) => if sent.is_err() { break },
                        }
                        if last {
                            break;
                        }
                    }
                }
            }
        });

        let mut stop = stop_rx;
        let write_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped(&mut stop) => break,
                    req = transmit_rx.recv() => {
                        let Some(req) = req else { break };
                        let result = written_tx
                            .send(req.data)
                            .map_err(|_| LinkError::transport("channel", "peer gone"));
                        let _ = req.result_tx.send(result);
                    }
                }
            }
        });

        Ok(TransportHandle::new(
            "channel",
            chunk_rx,
            transmit_tx,
            stop_tx,
            vec![forward_task, write_task],
        ))
    }
}

impl ChannelController {
    /// Make the next `open` fail with `err`. Failures queue in order.
    pub fn fail_next_open(&self, err: LinkError) {
        if let Ok(mut q) = self.shared.failures.lock() {
            q.push_back(err);
        }
    }

    /// While set, new `open` calls never complete.
    pub fn hold_opens(&self, hold: bool) {
        self.shared.hold.store(hold, Ordering::SeqCst);
    }

    /// Total `open` calls so far, including scripted failures.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Wait for the next successfully opened link.
    pub async fn next_peer(&mut self) -> Option<ChannelPeer> {
        self.peers_rx.recv().await
    }
}

impl ChannelPeer {
    /// Send raw bytes as one chunk.
    pub async fn push(&self, bytes: impl AsRef<[u8]>) -> Result<(), LinkError> {
        self.chunks
            .send(Ok(RawChunk::new(bytes.as_ref().to_vec())))
            .await
            .map_err(|_| LinkError::NotConnected)
    }

    /// Fail the read side with `err`; the link ends after it.
    pub async fn fail(&self, err: LinkError) -> Result<(), LinkError> {
        self.chunks.send(Err(err)).await.map_err(|_| LinkError::NotConnected)
    }

    /// Next bytes written by the session, or `None` once the handle is closed.
    pub async fn next_written(&mut self) -> Option<Vec<u8>> {
        self.written.recv().await
    }

    /// Resolves once the session side has released the link.
    pub async fn released(&self) {
        self.chunks.closed().await
    }

    /// Whether the session side has released the link.
    pub fn is_released(&self) -> bool {
        self.chunks.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_chunks_reach_reader() {
        let (transport, mut controller) = ChannelTransport::new();
        let handle = transport.open(&LinkConfig::default()).await.unwrap();
        let peer = controller.next_peer().await.unwrap();
        let mut reader = handle.attach_reader().unwrap();

        peer.push("STATUS:ON\n").await.unwrap();
        let chunk = reader.next().await.unwrap().unwrap();
        assert_eq!(chunk.bytes, b"STATUS:ON\n");
    }

    #[tokio::test]
    async fn test_dropping_peer_ends_read_sequence() {
        let (transport, mut controller) = ChannelTransport::new();
        let handle = transport.open(&LinkConfig::default()).await.unwrap();
        let peer = controller.next_peer().await.unwrap();
        let mut reader = handle.attach_reader().unwrap();

        drop(peer);
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_releases_peer_and_pending_read() {
        let (transport, mut controller) = ChannelTransport::new();
        let mut handle = transport.open(&LinkConfig::default()).await.unwrap();
        let peer = controller.next_peer().await.unwrap();
        let mut reader = handle.attach_reader().unwrap();

        let pending = tokio::spawn(async move { reader.next().await.is_none() });
        handle.close().await;

        assert!(pending.await.unwrap());
        peer.released().await;
        assert!(peer.is_released());
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let (transport, controller) = ChannelTransport::new();
        controller.fail_next_open(LinkError::permission_denied("channel", "denied"));

        let err = transport.open(&LinkConfig::default()).await.err().unwrap();
        assert!(matches!(err, LinkError::PermissionDenied { .. }));
        assert!(transport.open(&LinkConfig::default()).await.is_ok());
        assert_eq!(controller.open_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_read_ends_sequence_after_error() {
        let (transport, mut controller) = ChannelTransport::new();
        let handle = transport.open(&LinkConfig::default()).await.unwrap();
        let peer = controller.next_peer().await.unwrap();
        let mut reader = handle.attach_reader().unwrap();

        peer.fail(LinkError::transport("channel", "boom")).await.unwrap();
        assert!(matches!(reader.next().await, Some(Err(LinkError::Transport { .. }))));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_open_never_completes() {
        let (transport, controller) = ChannelTransport::new();
        controller.hold_opens(true);

        let held = tokio::time::timeout(Duration::from_secs(60), transport.open(&LinkConfig::default())).await;
        assert!(held.is_err());
        assert_eq!(controller.open_count(), 1);

        controller.hold_opens(false);
        assert!(transport.open(&LinkConfig::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_writes_reach_peer() {
        let (transport, mut controller) = ChannelTransport::new();
        let handle = transport.open(&LinkConfig::default()).await.unwrap();
        let mut peer = controller.next_peer().await.unwrap();

        handle.write(b"LED ON\n").await.unwrap();
        assert_eq!(peer.next_written().await.unwrap(), b"LED ON\n");
    }
}
