// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event Bus payload types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::ProcessId;

/// The event type a subscriber filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProcessStarted,
    ProcessStopped,
    ProcessFailed,
    LogLine,
    UrlDetected,
    InstanceConnected,
    InstanceDisconnected,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::ProcessStarted => "process.started",
            EventKind::ProcessStopped => "process.stopped",
            EventKind::ProcessFailed => "process.failed",
            EventKind::LogLine => "log.line",
            EventKind::UrlDetected => "url.detected",
            EventKind::InstanceConnected => "instance.connected",
            EventKind::InstanceDisconnected => "instance.disconnected",
        };
        write!(f, "{s}")
    }
}

/// One published event. `data` carries the kind-specific payload as a JSON
/// value so the bus stays generic over every producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub process_id: Option<ProcessId>,
    pub timestamp_ms: i64,
    pub data: Value,
}

impl Event {
    pub fn new(kind: EventKind, process_id: Option<ProcessId>, timestamp_ms: i64, data: Value) -> Self {
        Self {
            kind,
            process_id,
            timestamp_ms,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_kind_display_matches_wire_tag() {
        assert_eq!(EventKind::ProcessStarted.to_string(), "process.started");
        assert_eq!(EventKind::LogLine.to_string(), "log.line");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::new(
            EventKind::ProcessStarted,
            Some(ProcessId::new("p1")),
            42,
            json!({"pid": 100}),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "process_started");
        assert_eq!(value["process_id"], "p1");
    }
}
