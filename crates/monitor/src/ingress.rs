//! Line-oriented ingress records for replaying sensor sessions.
//!
//! Each line of a replay file is one JSON object tagged by `type`:
//!
//! ```text
//! {"type":"connect","device_id":"175030001053"}
//! {"type":"notification","device_id":"175030001053","content":"{\"average\":72.0,\"rrData\":[812]}"}
//! {"type":"sample","device_id":"175030001053","kind":"hr","timestamp":"2026-01-01T00:00:00Z","value":72.0}
//! {"type":"disconnect","device_id":"175030001053"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use triage_core::{Result, Sample, TriageError};

use crate::board::TriageBoard;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngressRecord {
    Connect {
        device_id: String,
    },
    Disconnect {
        device_id: String,
    },
    Sample(Sample),
    /// Raw wearable payload, decoded on arrival.
    Notification {
        device_id: String,
        content: String,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
}

impl IngressRecord {
    pub fn parse_line(line: &str) -> Result<Self> {
        serde_json::from_str(line)
            .map_err(|e| TriageError::MalformedSample(format!("invalid ingress record: {e}")))
    }

    pub fn device_id(&self) -> &str {
        match self {
            IngressRecord::Connect { device_id }
            | IngressRecord::Disconnect { device_id }
            | IngressRecord::Notification { device_id, .. } => device_id,
            IngressRecord::Sample(sample) => &sample.device_id,
        }
    }

    /// Apply this record to the board.
    pub async fn apply(self, board: &mut TriageBoard) -> Result<()> {
        match self {
            IngressRecord::Connect { device_id } => {
                let started = board.connect(&device_id).await?;
                debug!(device = %device_id, started, "connect handled");
            }
            IngressRecord::Disconnect { device_id } => {
                let stopped = board.disconnect(&device_id).await?;
                debug!(device = %device_id, stopped, "disconnect handled");
            }
            IngressRecord::Sample(sample) => board.on_sample(sample),
            IngressRecord::Notification {
                device_id,
                content,
                timestamp,
            } => {
                let at = timestamp.unwrap_or_else(Utc::now);
                board.on_notification(&device_id, &content, at);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::SignalKind;

    #[test]
    fn parses_each_record_type() {
        let connect = IngressRecord::parse_line(r#"{"type":"connect","device_id":"d1"}"#).unwrap();
        assert_eq!(
            connect,
            IngressRecord::Connect {
                device_id: "d1".into()
            }
        );

        let sample = IngressRecord::parse_line(
            r#"{"type":"sample","device_id":"d1","kind":"rr","timestamp":"2026-01-01T00:00:00Z","value":812.0}"#,
        )
        .unwrap();
        match &sample {
            IngressRecord::Sample(s) => {
                assert_eq!(s.kind, SignalKind::RrInterval);
                assert_eq!(s.value, 812.0);
            }
            other => panic!("expected sample, got: {other:?}"),
        }
        assert_eq!(sample.device_id(), "d1");

        let note = IngressRecord::parse_line(
            r#"{"type":"notification","device_id":"d2","content":"{\"average\":70}"}"#,
        )
        .unwrap();
        match note {
            IngressRecord::Notification { timestamp, content, .. } => {
                assert!(timestamp.is_none());
                assert_eq!(content, r#"{"average":70}"#);
            }
            other => panic!("expected notification, got: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let err = IngressRecord::parse_line(r#"{"type":"reboot","device_id":"d1"}"#).unwrap_err();
        assert!(matches!(err, TriageError::MalformedSample(_)));
    }
}
