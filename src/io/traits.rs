// src/io/traits.rs
//
// Transport trait and the handle every transport hands back from `open`.
//
// A handle owns the driver tasks for one open link. Chunks flow from the
// driver to a single attached reader; transmit requests flow the other way.
// Closing a handle signals the driver tasks to stop and waits for them, so the
// underlying port or socket is released by the time `close` returns.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::error::LinkError;
use super::types::{ChunkResult, LinkConfig, TransmitRequest, TransmitSender};

/// A physical channel to the hardware (serial device, bridge socket, in-process)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short identifier used in logs, e.g. "serial", "ws", "tcp"
    fn kind(&self) -> &'static str;

    /// Open the channel described by `config`.
    async fn open(&self, config: &LinkConfig) -> Result<TransportHandle, LinkError>;
}

/// Exclusively-owned handle to an open transport
pub struct TransportHandle {
    device: String,
    chunks: Arc<Mutex<Option<mpsc::Receiver<ChunkResult>>>>,
    transmit_tx: Option<TransmitSender>,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl TransportHandle {
    /// Assemble a handle from a driver's channels and tasks.
    /// The tasks must exit once `stop_tx` publishes `true`.
    pub fn new(
        device: impl Into<String>,
        chunks_rx: mpsc::Receiver<ChunkResult>,
        transmit_tx: TransmitSender,
        stop_tx: watch::Sender<bool>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            device: device.into(),
            chunks: Arc::new(Mutex::new(Some(chunks_rx))),
            transmit_tx: Some(transmit_tx),
            stop_tx,
            tasks,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Attach the single reader. Fails with `HandleBusy` until the previous
    /// reader is dropped.
    pub fn attach_reader(&self) -> Result<ChunkReader, LinkError> {
        let mut slot = self
            .chunks
            .lock()
            .map_err(|_| LinkError::transport(&self.device, "reader slot poisoned"))?;
        let rx = slot.take().ok_or(LinkError::HandleBusy)?;
        Ok(ChunkReader {
            slot: self.chunks.clone(),
            rx: Some(rx),
        })
    }

    /// Sender for transmit requests, usable while the handle stays open.
    pub fn transmitter(&self) -> Result<TransmitSender, LinkError> {
        self.transmit_tx.clone().ok_or(LinkError::NotConnected)
    }

    /// Best-effort send. Fails once the handle is closed or the peer is gone.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let tx = self.transmitter()?;
        transmit(&tx, &self.device, bytes.to_vec()).await
    }

    /// Stop the driver tasks and wait for them. Idempotent.
    pub async fn close(&mut self) {
        let _ = self.stop_tx.send(true);
        self.transmit_tx = None;
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        // Tasks observe the stop signal on their own; nothing to await here.
        let _ = self.stop_tx.send(true);
    }
}

/// Queue a transmit request and wait for the driver's result.
pub async fn transmit(tx: &TransmitSender, device: &str, data: Vec<u8>) -> Result<(), LinkError> {
    let (result_tx, result_rx) = oneshot::channel();
    tx.send(TransmitRequest { data, result_tx })
        .await
        .map_err(|_| LinkError::NotConnected)?;
    result_rx
        .await
        .map_err(|_| LinkError::transport(device, "write side closed before completing"))?
}

/// The attached reader of a `TransportHandle`.
/// Dropping it releases the handle for another reader.
pub struct ChunkReader {
    slot: Arc<Mutex<Option<mpsc::Receiver<ChunkResult>>>>,
    rx: Option<mpsc::Receiver<ChunkResult>>,
}

impl ChunkReader {
    /// Next chunk. `None` once the transport has closed, cleanly or after an
    /// error item.
    pub async fn next(&mut self) -> Option<ChunkResult> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            if let Ok(mut slot) = self.slot.lock() {
                *slot = Some(rx);
            }
        }
    }
}

/// Resolves once `stop` publishes `true` or its sender is dropped.
/// The watch guard never outlives this call, so the future stays `Send`
/// when used as a `select!` branch next to other awaits.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|s| *s).await;
}

/// Deliver an item to the reader from a blocking driver thread without
/// blocking past a stop request. Returns false when the driver should exit.
pub(crate) fn blocking_deliver(
    tx: &mpsc::Sender<ChunkResult>,
    stop_rx: &watch::Receiver<bool>,
    mut item: ChunkResult,
) -> bool {
    loop {
        match tx.try_send(item) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(back)) => {
                if *stop_rx.borrow() {
                    return false;
                }
                item = back;
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
        }
    }
}
