// src/events.rs
//
// Outward interface of the link: the session reports status, values, log
// lines, state transitions and command outcomes to an `EventSink`. Calls for
// one connection arrive in order from a single task.
//
// Stock sinks:
// - ChannelSink: forwards `LinkEvent`s over a tokio channel (render loops, CLI)
// - PolicySink:  consumer-side filtering (value range, telemetry logging)
// - HistorySink: bounded log history plus last status/value for a UI

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::io::LinkState;
use crate::log_history::{LogHistory, DEFAULT_LOG_CAPACITY_CHARS, DEFAULT_LOG_CAPACITY_LINES};

// ============================================================================
// Sink Trait
// ============================================================================

/// Consumer of link events
pub trait EventSink: Send + Sync {
    /// Hardware went online/offline (explicit status line, successful open, or
    /// loss of the link).
    fn on_status_changed(&self, online: bool);

    /// A finite reading and the line it was extracted from
    fn on_value(&self, value: f64, raw_text: &str);

    /// Console text: opaque lines from the device, command echoes, failures
    fn on_log(&self, text: &str);

    /// Lifecycle transition
    fn on_state_changed(&self, _state: LinkState) {}

    /// Result of a `send`
    fn on_command(&self, _outcome: &CommandOutcome) {}
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn on_status_changed(&self, online: bool) {
        (**self).on_status_changed(online)
    }
    fn on_value(&self, value: f64, raw_text: &str) {
        (**self).on_value(value, raw_text)
    }
    fn on_log(&self, text: &str) {
        (**self).on_log(text)
    }
    fn on_state_changed(&self, state: LinkState) {
        (**self).on_state_changed(state)
    }
    fn on_command(&self, outcome: &CommandOutcome) {
        (**self).on_command(outcome)
    }
}

/// Result of a command sent through the link
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    Accepted { text: String },
    Rejected { text: String, reason: String },
}

/// Serializable form of every sink callback
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkEvent {
    Status { online: bool },
    Value { value: f64, raw: String },
    Log { text: String },
    State { state: LinkState },
    Command { outcome: CommandOutcome },
}

// ============================================================================
// Channel Sink
// ============================================================================

/// Forwards every callback as a `LinkEvent`, preserving order
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

/// Create a channel sink and the receiver its events arrive on.
pub fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<LinkEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

impl ChannelSink {
    fn emit(&self, event: LinkEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_status_changed(&self, online: bool) {
        self.emit(LinkEvent::Status { online });
    }
    fn on_value(&self, value: f64, raw_text: &str) {
        self.emit(LinkEvent::Value {
            value,
            raw: raw_text.to_string(),
        });
    }
    fn on_log(&self, text: &str) {
        self.emit(LinkEvent::Log {
            text: text.to_string(),
        });
    }
    fn on_state_changed(&self, state: LinkState) {
        self.emit(LinkEvent::State { state });
    }
    fn on_command(&self, outcome: &CommandOutcome) {
        self.emit(LinkEvent::Command {
            outcome: outcome.clone(),
        });
    }
}

// ============================================================================
// Consumer Policy
// ============================================================================

/// Inclusive valid range for readings
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `-limit..=limit`
    pub fn symmetric(limit: f64) -> Self {
        Self {
            min: -limit.abs(),
            max: limit.abs(),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Presentation-side decisions the link itself does not make
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumerPolicy {
    /// Drop readings outside this range. `None` forwards everything.
    #[serde(default)]
    pub valid_range: Option<ValueRange>,
    /// Also log the raw text of every reading
    #[serde(default)]
    pub log_telemetry: bool,
    #[serde(default = "default_log_capacity_chars")]
    pub log_capacity_chars: usize,
    #[serde(default = "default_log_capacity_lines")]
    pub log_capacity_lines: usize,
}

fn default_log_capacity_chars() -> usize {
    DEFAULT_LOG_CAPACITY_CHARS
}
fn default_log_capacity_lines() -> usize {
    DEFAULT_LOG_CAPACITY_LINES
}

impl Default for ConsumerPolicy {
    fn default() -> Self {
        Self {
            valid_range: None,
            log_telemetry: false,
            log_capacity_chars: default_log_capacity_chars(),
            log_capacity_lines: default_log_capacity_lines(),
        }
    }
}

/// Applies a `ConsumerPolicy` in front of another sink
pub struct PolicySink<S> {
    inner: S,
    policy: ConsumerPolicy,
}

impl<S: EventSink> PolicySink<S> {
    pub fn new(inner: S, policy: ConsumerPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: EventSink> EventSink for PolicySink<S> {
    fn on_status_changed(&self, online: bool) {
        self.inner.on_status_changed(online);
    }

    fn on_value(&self, value: f64, raw_text: &str) {
        if let Some(range) = self.policy.valid_range {
            if !range.contains(value) {
                return;
            }
        }
        self.inner.on_value(value, raw_text);
        if self.policy.log_telemetry {
            self.inner.on_log(raw_text);
        }
    }

    fn on_log(&self, text: &str) {
        self.inner.on_log(text);
    }

    fn on_state_changed(&self, state: LinkState) {
        self.inner.on_state_changed(state);
    }

    fn on_command(&self, outcome: &CommandOutcome) {
        self.inner.on_command(outcome);
    }
}

// ============================================================================
// History Sink
// ============================================================================

/// What a UI panel shows: console history, status dot, latest reading
#[derive(Clone, Debug)]
pub struct HistorySnapshot {
    pub online: bool,
    pub state: LinkState,
    pub last_value: Option<f64>,
    pub log: String,
}

struct HistoryState {
    history: LogHistory,
    online: bool,
    state: LinkState,
    last_value: Option<f64>,
}

/// Keeps bounded console history and the latest status/value
pub struct HistorySink {
    state: Mutex<HistoryState>,
}

impl HistorySink {
    pub fn new(policy: &ConsumerPolicy) -> Self {
        Self {
            state: Mutex::new(HistoryState {
                history: LogHistory::new(policy.log_capacity_chars, policy.log_capacity_lines),
                online: false,
                state: LinkState::Disconnected,
                last_value: None,
            }),
        }
    }

    pub fn snapshot(&self) -> Option<HistorySnapshot> {
        let guard = self.state.lock().ok()?;
        Some(HistorySnapshot {
            online: guard.online,
            state: guard.state,
            last_value: guard.last_value,
            log: guard.history.text(),
        })
    }

    fn with_state(&self, f: impl FnOnce(&mut HistoryState)) {
        if let Ok(mut guard) = self.state.lock() {
            f(&mut guard);
        }
    }
}

impl EventSink for HistorySink {
    fn on_status_changed(&self, online: bool) {
        self.with_state(|s| s.online = online);
    }
    fn on_value(&self, value: f64, _raw_text: &str) {
        self.with_state(|s| s.last_value = Some(value));
    }
    fn on_log(&self, text: &str) {
        self.with_state(|s| s.history.push(text));
    }
    fn on_state_changed(&self, state: LinkState) {
        self.with_state(|s| s.state = state);
    }
}
