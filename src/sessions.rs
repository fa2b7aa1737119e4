// src/sessions.rs
//
// Connection lifecycle for the hardware link.
//
// A `LinkSession` owns at most one supervisor task. The supervisor opens the
// transport, runs the decode/classify read loop while Connected, and retries
// at a fixed interval after every failure until `disconnect()` cancels it.
//
//   Disconnected --connect()--> Connecting --open ok--> Connected
//        ^                          |                       |
//        |<------- open failed -----+                       |
//        |<------- transport closed / read error -----------+
//        |<------- Closing <-------- disconnect() ----------+
//
// Each pass through Connecting is a fresh attempt with a fresh handle; handles
// are never reused across attempts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::{CommandOutcome, EventSink};
use crate::framing::{DecodedFrame, LineDecoder, DEFAULT_MAX_FRAME_LEN};
use crate::io::traits::{stopped, transmit, ChunkReader};
use crate::io::{transport_for, LinkConfig, LinkError, LinkState, TransmitSender, Transport};
use crate::telemetry::{classify, TelemetryEvent};

/// Default delay between automatic reconnect attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(2000);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Options
// ============================================================================

/// Runtime knobs for a session
#[derive(Clone, Debug, PartialEq)]
pub struct SessionOptions {
    /// Fixed delay between reconnect attempts. There is no retry cap.
    pub retry_interval: Duration,
    /// Decode buffer cap without a terminator
    pub max_frame_len: usize,
    /// Appended to every outbound command
    pub line_ending: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            line_ending: "\n".to_string(),
        }
    }
}

// ============================================================================
// Shared State
// ============================================================================

struct SessionShared {
    state: LinkState,
    retry_count: u32,
    attempt_id: u64,
    device: String,
    /// Set only while Connected
    writer: Option<TransmitSender>,
    /// Present while a supervisor runs (connecting, connected, or in backoff)
    cancel: Option<watch::Sender<bool>>,
    supervisor: Option<JoinHandle<()>>,
}

fn lock(shared: &Mutex<SessionShared>) -> MutexGuard<'_, SessionShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set the state and report whether it changed.
fn set_state(shared: &Mutex<SessionShared>, state: LinkState) -> bool {
    let mut s = lock(shared);
    let changed = s.state != state;
    s.state = state;
    changed
}

// ============================================================================
// Session
// ============================================================================

/// One logical hardware link: inward commands plus the supervisor that feeds
/// an `EventSink`.
pub struct LinkSession {
    id: u64,
    /// Fixed transport; when absent one is picked per connect from the config
    transport: Option<Arc<dyn Transport>>,
    sink: Arc<dyn EventSink>,
    options: SessionOptions,
    shared: Arc<Mutex<SessionShared>>,
    /// Serializes connect/disconnect
    control: tokio::sync::Mutex<()>,
}

impl LinkSession {
    /// Session that picks serial or bridge transport from each connect config.
    pub fn new(sink: Arc<dyn EventSink>, options: SessionOptions) -> Self {
        Self::build(None, sink, options)
    }

    /// Session bound to a specific transport.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
        options: SessionOptions,
    ) -> Self {
        Self::build(Some(transport), sink, options)
    }

    fn build(
        transport: Option<Arc<dyn Transport>>,
        sink: Arc<dyn EventSink>,
        options: SessionOptions,
    ) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            sink,
            options,
            shared: Arc::new(Mutex::new(SessionShared {
                state: LinkState::Disconnected,
                retry_count: 0,
                attempt_id: 0,
                device: String::new(),
                writer: None,
                cancel: None,
                supervisor: None,
            })),
            control: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> LinkState {
        lock(&self.shared).state
    }

    /// Failed attempts since the last successful open
    pub fn retry_count(&self) -> u32 {
        lock(&self.shared).retry_count
    }

    /// Id of the current (or most recent) connection attempt
    pub fn attempt_id(&self) -> u64 {
        lock(&self.shared).attempt_id
    }

    /// Start the link and its reconnect loop.
    ///
    /// Fails with `AlreadyConnected` while connecting, connected or closing.
    /// Called during backoff, the pending retry is dropped and a new attempt
    /// starts immediately with `config`.
    pub async fn connect(&self, config: LinkConfig) -> Result<(), LinkError> {
        config.validate()?;
        let transport = match &self.transport {
            Some(t) => t.clone(),
            None => transport_for(&config)?,
        };

        let _control = self.control.lock().await;

        let (stale_cancel, stale_supervisor) = {
            let mut s = lock(&self.shared);
            match s.state {
                LinkState::Connecting | LinkState::Connected | LinkState::Closing => {
                    return Err(LinkError::AlreadyConnected);
                }
                LinkState::Disconnected => (s.cancel.take(), s.supervisor.take()),
            }
        };

        if let Some(cancel) = stale_cancel {
            let _ = cancel.send(true);
        }
        if let Some(task) = stale_supervisor {
            tlog!("[session:{}] Restarting reconnect loop", self.id);
            let _ = task.await;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut s = lock(&self.shared);
            s.state = LinkState::Connecting;
            s.cancel = Some(cancel_tx);
        }
        self.sink.on_state_changed(LinkState::Connecting);

        tlog!(
            "[session:{}] Connecting via {} ({})",
            self.id,
            transport.kind(),
            config.describe()
        );

        let supervisor = Supervisor {
            session_id: self.id,
            transport,
            config,
            sink: self.sink.clone(),
            options: self.options.clone(),
            shared: self.shared.clone(),
            cancel: cancel_rx,
        };
        let task = tokio::spawn(supervisor.run());
        lock(&self.shared).supervisor = Some(task);
        Ok(())
    }

    /// Stop the link and the reconnect loop. Returns once the transport
    /// handle has been released. Idempotent.
    pub async fn disconnect(&self) {
        let _control = self.control.lock().await;

        let (cancel, supervisor, closing) = {
            let mut s = lock(&self.shared);
            let closing = s.state == LinkState::Connected;
            if closing {
                s.state = LinkState::Closing;
                s.writer = None;
            }
            (s.cancel.take(), s.supervisor.take(), closing)
        };

        let Some(supervisor) = supervisor else {
            return;
        };

        if closing {
            self.sink.on_state_changed(LinkState::Closing);
        }
        tlog!("[session:{}] Disconnect requested", self.id);

        if let Some(cancel) = cancel {
            let _ = cancel.send(true);
        }
        let _ = supervisor.await;

        // Cancelled while connecting or in backoff: no link was up, so no
        // status change, just the state.
        if set_state(&self.shared, LinkState::Disconnected) {
            self.sink.on_state_changed(LinkState::Disconnected);
        }
    }

    /// Send one command line. Only accepted while Connected; every rejection
    /// is also reported through the sink.
    pub async fn send(&self, text: &str) -> Result<(), LinkError> {
        let text = text.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            self.sink.on_command(&CommandOutcome::Rejected {
                text: text.to_string(),
                reason: "empty command".to_string(),
            });
            return Ok(());
        }

        let target = {
            let s = lock(&self.shared);
            match (&s.state, &s.writer) {
                (LinkState::Connected, Some(writer)) => Some((writer.clone(), s.device.clone())),
                _ => None,
            }
        };

        let Some((writer, device)) = target else {
            self.reject(text, &LinkError::NotConnected);
            return Err(LinkError::NotConnected);
        };

        let mut data = text.as_bytes().to_vec();
        data.extend_from_slice(self.options.line_ending.as_bytes());

        match transmit(&writer, &device, data).await {
            Ok(()) => {
                self.sink.on_log(&format!(">> {}", text));
                self.sink.on_command(&CommandOutcome::Accepted {
                    text: text.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                tlog!("[session:{}] Write to {} failed: {}", self.id, device, e);
                self.reject(text, &e);
                Err(e)
            }
        }
    }

    fn reject(&self, text: &str, err: &LinkError) {
        self.sink
            .on_log(&format!("[!] command not sent ({}): {}", err, text));
        self.sink.on_command(&CommandOutcome::Rejected {
            text: text.to_string(),
            reason: err.to_string(),
        });
    }
}

impl Drop for LinkSession {
    fn drop(&mut self) {
        // The supervisor closes its handle on its own once cancelled
        if let Some(cancel) = lock(&self.shared).cancel.take() {
            let _ = cancel.send(true);
        }
    }
}

// ============================================================================
// Supervisor
// ============================================================================

enum ReadExit {
    Cancelled,
    Closed,
    Failed(LinkError),
}

struct Supervisor {
    session_id: u64,
    transport: Arc<dyn Transport>,
    config: LinkConfig,
    sink: Arc<dyn EventSink>,
    options: SessionOptions,
    shared: Arc<Mutex<SessionShared>>,
    cancel: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut decoder = LineDecoder::new(self.options.max_frame_len);
        let mut first = true;

        loop {
            if !first && set_state(&self.shared, LinkState::Connecting) {
                self.sink.on_state_changed(LinkState::Connecting);
            }
            first = false;

            let attempt = {
                let mut s = lock(&self.shared);
                s.attempt_id += 1;
                s.attempt_id
            };

            let opened = tokio::select! {
                biased;
                _ = stopped(&mut self.cancel) => return,
                result = self.transport.open(&self.config) => result,
            };

            match opened {
                Ok(mut handle) => {
                    let exit = match handle.attach_reader() {
                        Ok(reader) => {
                            {
                                let mut s = lock(&self.shared);
                                s.retry_count = 0;
                                s.device = handle.device().to_string();
                                s.writer = handle.transmitter().ok();
                                s.state = LinkState::Connected;
                            }
                            tlog!(
                                "[session:{}] Attempt {} connected to {}",
                                self.session_id,
                                attempt,
                                handle.device()
                            );
                            self.sink.on_state_changed(LinkState::Connected);
                            self.sink.on_status_changed(true);

                            self.read_loop(reader, &mut decoder).await
                        }
                        Err(e) => ReadExit::Failed(e),
                    };

                    decoder.reset();
                    lock(&self.shared).writer = None;
                    handle.close().await;

                    let was_up = matches!(
                        lock(&self.shared).state,
                        LinkState::Connected | LinkState::Closing
                    );
                    if was_up {
                        self.sink.on_status_changed(false);
                    }
                    if set_state(&self.shared, LinkState::Disconnected) {
                        self.sink.on_state_changed(LinkState::Disconnected);
                    }

                    match exit {
                        ReadExit::Cancelled => {
                            tlog!("[session:{}] Link closed by request", self.session_id);
                            return;
                        }
                        ReadExit::Closed => {
                            tlog!("[session:{}] Transport closed", self.session_id);
                        }
                        ReadExit::Failed(e) => {
                            tlog!("[session:{}] Link lost: {}", self.session_id, e);
                            self.sink.on_log(&format!("[!] connection lost: {}", e));
                        }
                    }
                }
                Err(e) => {
                    let retries = {
                        let mut s = lock(&self.shared);
                        s.retry_count = s.retry_count.saturating_add(1);
                        s.retry_count
                    };
                    tlog!(
                        "[session:{}] Attempt {} failed ({} in a row): {}",
                        self.session_id,
                        attempt,
                        retries,
                        e
                    );
                    self.sink.on_log(&format!("[!] connection failed: {}", e));
                    if set_state(&self.shared, LinkState::Disconnected) {
                        self.sink.on_state_changed(LinkState::Disconnected);
                    }
                }
            }

            tokio::select! {
                biased;
                _ = stopped(&mut self.cancel) => return,
                _ = tokio::time::sleep(self.options.retry_interval) => {}
            }
        }
    }

    async fn read_loop(&mut self, mut reader: ChunkReader, decoder: &mut LineDecoder) -> ReadExit {
        loop {
            let item = tokio::select! {
                biased;
                _ = stopped(&mut self.cancel) => return ReadExit::Cancelled,
                item = reader.next() => item,
            };

            let chunk = match item {
                None => return ReadExit::Closed,
                Some(Err(e)) => return ReadExit::Failed(e),
                Some(Ok(chunk)) => chunk,
            };

            for frame in decoder.push(&chunk.bytes) {
                if *self.cancel.borrow() {
                    return ReadExit::Cancelled;
                }
                self.dispatch(frame);
            }
        }
    }

    fn dispatch(&self, frame: DecodedFrame) {
        match frame {
            DecodedFrame::Line(line) => match classify(&line) {
                TelemetryEvent::Status { online } => self.sink.on_status_changed(online),
                TelemetryEvent::Value { value, raw } => self.sink.on_value(value, &raw),
                TelemetryEvent::Text { text } => self.sink.on_log(&text),
            },
            DecodedFrame::Overflow { discarded } => {
                let err = LinkError::MalformedFrame { discarded };
                tlog!("[session:{}] {}", self.session_id, err);
                self.sink.on_log(&format!("[!] {}", err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{channel_sink, LinkEvent};
    use crate::io::channel::{ChannelController, ChannelTransport};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::Instant;

    fn session_with(options: SessionOptions) -> (LinkSession, ChannelController, UnboundedReceiver<LinkEvent>) {
        let (transport, controller) = ChannelTransport::new();
        let (sink, rx) = channel_sink();
        let session = LinkSession::with_transport(Arc::new(transport), Arc::new(sink), options);
        (session, controller, rx)
    }

    fn session() -> (LinkSession, ChannelController, UnboundedReceiver<LinkEvent>) {
        session_with(SessionOptions::default())
    }

    async fn next_event(rx: &mut UnboundedReceiver<LinkEvent>) -> LinkEvent {
        rx.recv().await.expect("sink closed")
    }

    fn state(s: LinkState) -> LinkEvent {
        LinkEvent::State { state: s }
    }

    fn status(online: bool) -> LinkEvent {
        LinkEvent::Status { online }
    }

    async fn expect_connected(rx: &mut UnboundedReceiver<LinkEvent>) {
        assert_eq!(next_event(rx).await, state(LinkState::Connected));
        assert_eq!(next_event(rx).await, status(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reports_status_true() {
        let (session, mut controller, mut rx) = session();
        session.connect(LinkConfig::default()).await.unwrap();
        let _peer = controller.next_peer().await.unwrap();

        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        expect_connected(&mut rx).await;
        assert_eq!(session.state(), LinkState::Connected);
        assert_eq!(session.attempt_id(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lines_are_classified_and_delivered_in_order() {
        let (session, mut controller, mut rx) = session();
        session.connect(LinkConfig::default()).await.unwrap();
        let peer = controller.next_peer().await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        expect_connected(&mut rx).await;

        peer.push("STATUS:OFF\nAngulo: 15").await.unwrap();
        peer.push("0.00\r\nready\n").await.unwrap();

        assert_eq!(next_event(&mut rx).await, status(false));
        assert_eq!(
            next_event(&mut rx).await,
            LinkEvent::Value {
                value: 150.0,
                raw: "Angulo: 150.00".to_string()
            }
        );
        assert_eq!(next_event(&mut rx).await, LinkEvent::Log { text: "ready".to_string() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_close_then_fixed_backoff() {
        let (session, mut controller, mut rx) = session();
        session.connect(LinkConfig::default()).await.unwrap();
        let peer = controller.next_peer().await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        expect_connected(&mut rx).await;

        drop(peer);
        assert_eq!(next_event(&mut rx).await, status(false));
        assert_eq!(next_event(&mut rx).await, state(LinkState::Disconnected));

        let lost_at = Instant::now();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        assert!(lost_at.elapsed() >= DEFAULT_RETRY_INTERVAL);

        let _peer = controller.next_peer().await.unwrap();
        expect_connected(&mut rx).await;
        assert_eq!(session.attempt_id(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_while_connected_reports_lost_link() {
        let (session, mut controller, mut rx) = session();
        session.connect(LinkConfig::default()).await.unwrap();
        let peer = controller.next_peer().await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        expect_connected(&mut rx).await;

        peer.push("Angulo: 1").await.unwrap();
        peer.fail(LinkError::transport("channel", "boom")).await.unwrap();

        assert_eq!(next_event(&mut rx).await, status(false));
        assert_eq!(next_event(&mut rx).await, state(LinkState::Disconnected));
        assert_eq!(
            next_event(&mut rx).await,
            LinkEvent::Log {
                text: "[!] connection lost: channel: boom".to_string()
            }
        );
        let lost_at = Instant::now();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        assert!(lost_at.elapsed() >= DEFAULT_RETRY_INTERVAL);

        // The partial line died with the old link
        let peer = controller.next_peer().await.unwrap();
        expect_connected(&mut rx).await;
        peer.push("ready\n").await.unwrap();
        assert_eq!(next_event(&mut rx).await, LinkEvent::Log { text: "ready".to_string() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_opens_retry_forever_and_reset_counter() {
        let (session, mut controller, mut rx) = session();
        controller.fail_next_open(LinkError::device_unavailable("channel", "unplugged"));
        controller.fail_next_open(LinkError::network_unreachable("channel", "refused"));

        session.connect(LinkConfig::default()).await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));

        for failures in 1..=2 {
            match next_event(&mut rx).await {
                LinkEvent::Log { text } => assert!(text.starts_with("[!] connection failed:")),
                other => panic!("unexpected {:?}", other),
            }
            assert_eq!(next_event(&mut rx).await, state(LinkState::Disconnected));
            assert_eq!(session.retry_count(), failures);
            let failed_at = Instant::now();
            assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
            assert!(failed_at.elapsed() >= DEFAULT_RETRY_INTERVAL);
        }

        let _peer = controller.next_peer().await.unwrap();
        expect_connected(&mut rx).await;
        assert_eq!(session.retry_count(), 0);
        assert_eq!(controller.open_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_never_writes() {
        let (session, controller, mut rx) = session();

        let err = session.send("LED ON").await.unwrap_err();
        assert_eq!(err, LinkError::NotConnected);

        match next_event(&mut rx).await {
            LinkEvent::Log { text } => assert!(text.contains("not connected")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            next_event(&mut rx).await,
            LinkEvent::Command {
                outcome: CommandOutcome::Rejected {
                    text: "LED ON".to_string(),
                    reason: "not connected".to_string()
                }
            }
        );
        assert_eq!(controller.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_appends_line_ending_and_echoes() {
        let (session, mut controller, mut rx) = session();
        session.connect(LinkConfig::default()).await.unwrap();
        let mut peer = controller.next_peer().await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        expect_connected(&mut rx).await;

        session.send("LED ON").await.unwrap();
        assert_eq!(peer.next_written().await.unwrap(), b"LED ON\n");
        assert_eq!(next_event(&mut rx).await, LinkEvent::Log { text: ">> LED ON".to_string() });
        assert!(matches!(
            next_event(&mut rx).await,
            LinkEvent::Command {
                outcome: CommandOutcome::Accepted { .. }
            }
        ));

        // Empty input is ignored
        session.send("   ").await.unwrap();
        assert!(matches!(
            next_event(&mut rx).await,
            LinkEvent::Command {
                outcome: CommandOutcome::Rejected { .. }
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_twice_single_status_false() {
        let (session, mut controller, mut rx) = session();
        session.connect(LinkConfig::default()).await.unwrap();
        let peer = controller.next_peer().await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        expect_connected(&mut rx).await;

        session.disconnect().await;
        assert!(peer.is_released());
        session.disconnect().await;

        assert_eq!(next_event(&mut rx).await, state(LinkState::Closing));
        assert_eq!(next_event(&mut rx).await, status(false));
        assert_eq!(next_event(&mut rx).await, state(LinkState::Disconnected));
        assert!(rx.try_recv().is_err());

        // No auto-reconnect after an explicit disconnect
        tokio::time::sleep(DEFAULT_RETRY_INTERVAL * 5).await;
        assert_eq!(controller.open_count(), 1);
        assert_eq!(session.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_backoff() {
        let (session, controller, mut rx) = session();
        controller.fail_next_open(LinkError::device_unavailable("channel", "unplugged"));

        session.connect(LinkConfig::default()).await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        assert!(matches!(next_event(&mut rx).await, LinkEvent::Log { .. }));
        assert_eq!(next_event(&mut rx).await, state(LinkState::Disconnected));

        session.disconnect().await;
        tokio::time::sleep(DEFAULT_RETRY_INTERVAL * 5).await;
        assert_eq!(controller.open_count(), 1);
        // Never went online, so no status change
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connecting() {
        let (session, controller, mut rx) = session();
        controller.hold_opens(true);

        session.connect(LinkConfig::default()).await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        while controller.open_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        session.disconnect().await;
        assert_eq!(session.state(), LinkState::Disconnected);
        assert_eq!(next_event(&mut rx).await, state(LinkState::Disconnected));
        // The link never came up: no status change
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(DEFAULT_RETRY_INTERVAL * 3).await;
        assert_eq!(controller.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_during_backoff_restarts_immediately() {
        let (session, mut controller, mut rx) = session();
        controller.fail_next_open(LinkError::device_unavailable("channel", "unplugged"));

        session.connect(LinkConfig::default()).await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        assert!(matches!(next_event(&mut rx).await, LinkEvent::Log { .. }));
        assert_eq!(next_event(&mut rx).await, state(LinkState::Disconnected));

        let started = Instant::now();
        session.connect(LinkConfig::default()).await.unwrap();
        let _peer = controller.next_peer().await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        expect_connected(&mut rx).await;
        assert!(started.elapsed() < DEFAULT_RETRY_INTERVAL);
        assert_eq!(controller.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_is_rejected() {
        let (session, mut controller, _rx) = session();
        session.connect(LinkConfig::default()).await.unwrap();
        let _peer = controller.next_peer().await.unwrap();

        assert_eq!(
            session.connect(LinkConfig::default()).await,
            Err(LinkError::AlreadyConnected)
        );
        assert_eq!(controller.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_reported_once() {
        let options = SessionOptions {
            max_frame_len: 64,
            ..SessionOptions::default()
        };
        let (session, mut controller, mut rx) = session_with(options);
        session.connect(LinkConfig::default()).await.unwrap();
        let peer = controller.next_peer().await.unwrap();
        assert_eq!(next_event(&mut rx).await, state(LinkState::Connecting));
        expect_connected(&mut rx).await;

        for _ in 0..50 {
            peer.push([b'#'; 40]).await.unwrap();
        }
        peer.push("\nAngulo: 5\n").await.unwrap();

        let mut malformed = 0;
        loop {
            match next_event(&mut rx).await {
                LinkEvent::Log { text } if text.contains("malformed frame") => malformed += 1,
                LinkEvent::Value { value, .. } => {
                    assert_eq!(value, 5.0);
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(malformed, 1);
        assert_eq!(session.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_synchronously() {
        let (sink, _rx) = channel_sink();
        let session = LinkSession::new(Arc::new(sink), SessionOptions::default());
        let err = session.connect(LinkConfig::bridge("ftp://nowhere")).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidConfig(_)));
        assert_eq!(session.state(), LinkState::Disconnected);
    }
}
