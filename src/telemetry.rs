// src/telemetry.rs
//
// Classification of decoded lines into typed telemetry events.
//
// Rules, in order:
// 1. `STATUS:<token>` -> Status(token == "ON"), exact and case-sensitive
// 2. first decimal number anywhere in the line -> Value (line kept as raw text)
// 3. anything else -> Text
//
// Number extraction is a first-match heuristic over noisy text. It is lossy by
// nature ("v1.2.3" reads as 1.2) and lives behind `extract_number` so a
// stricter protocol can replace it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Literal prefix of a status line
pub const STATUS_PREFIX: &str = "STATUS:";

/// Token meaning "online"
pub const STATUS_ONLINE_TOKEN: &str = "ON";

/// Optional sign, digits, optional decimal point, digits (ASCII only)
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?[0-9]*\.?[0-9]+").expect("number pattern is valid"));

/// A classified line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Hardware-reported online/offline
    Status { online: bool },
    /// A finite numeric reading and the line it came from
    Value { value: f64, raw: String },
    /// Free text for display only
    Text { text: String },
}

/// Classify one trimmed line.
pub fn classify(line: &str) -> TelemetryEvent {
    if let Some(token) = line.strip_prefix(STATUS_PREFIX) {
        return TelemetryEvent::Status {
            online: token == STATUS_ONLINE_TOKEN,
        };
    }

    match extract_number(line) {
        Some(value) => TelemetryEvent::Value {
            value,
            raw: line.to_string(),
        },
        None => TelemetryEvent::Text {
            text: line.to_string(),
        },
    }
}

/// First decimal number in `text`, if it parses to a finite value.
pub fn extract_number(text: &str) -> Option<f64> {
    let m = NUMBER_RE.find(text)?;
    m.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}
