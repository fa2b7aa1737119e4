// src/lib.rs
//
// Hardware link and telemetry synchronization.
//
// transport (io) -> line decoder (framing) -> classifier (telemetry)
//   -> connection state machine (sessions) -> event sink (events)

#[macro_use]
pub mod logging;

pub mod events;
pub mod framing;
pub mod io;
pub mod log_history;
pub mod sessions;
pub mod settings;
pub mod telemetry;

pub use events::{
    channel_sink, ChannelSink, CommandOutcome, ConsumerPolicy, EventSink, HistorySink, LinkEvent,
    PolicySink, ValueRange,
};
pub use framing::{DecodedFrame, LineDecoder};
pub use io::{LinkConfig, LinkError, LinkState, Transport, TransportMode};
pub use log_history::LogHistory;
pub use sessions::{LinkSession, SessionOptions};
pub use settings::LinkSettings;
pub use telemetry::{classify, TelemetryEvent};
