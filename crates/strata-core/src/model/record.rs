//! Raw records and their per-kind payloads.
//!
//! Raw records are produced by the surrounding runtime and stored as
//! `raw.<kind>` nodes whose attributes are the payload. The engine only
//! reads them (and eventually deletes them).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strata_store::{GraphNode, NodeId};

use super::kind::RecordKind;
use crate::error::ValidationError;

/// A fine-grained record as stored by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: NodeId,
    pub kind: RecordKind,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl RawRecord {
    pub fn new(
        id: impl Into<String>,
        kind: RecordKind,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: NodeId::new(id),
            kind,
            timestamp,
            payload,
        }
    }

    /// Read a raw node back as a record of `kind`.
    pub fn from_node(kind: RecordKind, node: &GraphNode) -> Result<Self, ValidationError> {
        if node.node_type != kind.raw_node_type() {
            return Err(ValidationError::MalformedPayload {
                id: node.id.to_string(),
                kind: kind.to_string(),
                reason: format!("node type {} is not {}", node.node_type, kind.raw_node_type()),
            });
        }
        Ok(Self {
            id: node.id.clone(),
            kind,
            timestamp: node.timestamp,
            payload: node.attributes.clone(),
        })
    }

    /// Node representation used when ingesting records into a store.
    pub fn to_node(&self) -> GraphNode {
        GraphNode {
            id: self.id.clone(),
            node_type: self.kind.raw_node_type(),
            timestamp: self.timestamp,
            attributes: self.payload.clone(),
            created_at: self.timestamp,
        }
    }

    /// Decode the payload into its typed form and check field invariants.
    pub fn payload_as<P: Payload>(&self) -> Result<P, ValidationError> {
        let payload: P = serde_json::from_value(self.payload.clone()).map_err(|e| {
            ValidationError::MalformedPayload {
                id: self.id.to_string(),
                kind: self.kind.to_string(),
                reason: e.to_string(),
            }
        })?;
        payload.validate().map_err(|(field, reason)| ValidationError::InvalidField {
            id: self.id.to_string(),
            field,
            reason,
        })?;
        Ok(payload)
    }
}

/// Typed payload of one record kind.
pub trait Payload: DeserializeOwned {
    /// Field-level checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), (&'static str, String)> {
        Ok(())
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), (&'static str, String)> {
    if value.trim().is_empty() {
        Err((field, "must not be empty".to_string()))
    } else {
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), (&'static str, String)> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err((field, format!("expected a finite, non-negative number, got {value}")))
    }
}

/// `raw.metrics`: one datapoint of a named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub metric_name: String,
    pub value: f64,
}

impl Payload for MetricPoint {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        non_empty("metric_name", &self.metric_name)?;
        if !self.value.is_finite() {
            return Err(("value", format!("expected a finite number, got {}", self.value)));
        }
        Ok(())
    }
}

/// `raw.audit`: one action taken by an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub actor: String,
    #[serde(default)]
    pub outcome: Option<String>,
}

impl Payload for AuditEvent {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        non_empty("action", &self.action)?;
        non_empty("actor", &self.actor)
    }
}

/// `raw.traces`: one finished span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
    pub trace_id: String,
    pub component: String,
    pub duration_ms: f64,
    #[serde(default)]
    pub status: Option<String>,
}

impl Payload for TraceSpan {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        non_empty("trace_id", &self.trace_id)?;
        non_empty("component", &self.component)?;
        non_negative("duration_ms", self.duration_ms)
    }
}

/// `raw.conversations`: one message on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub channel_id: String,
    pub role: String,
    #[serde(default)]
    pub tokens: Option<u64>,
}

impl Payload for ConversationMessage {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        non_empty("channel_id", &self.channel_id)?;
        non_empty("role", &self.role)
    }
}

/// `raw.tasks`: one task state report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
}

impl Payload for TaskEvent {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        non_empty("task_id", &self.task_id)?;
        non_empty("status", &self.status)?;
        match self.duration_ms {
            Some(ms) => non_negative("duration_ms", ms),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(kind: RecordKind, payload: serde_json::Value) -> RawRecord {
        RawRecord::new(
            "r1",
            kind,
            Utc.with_ymd_and_hms(2025, 7, 7, 1, 0, 0).unwrap(),
            payload,
        )
    }

    #[test]
    fn test_metric_payload_decodes() {
        let r = record(
            RecordKind::Metrics,
            json!({"metric_name": "llm.tokens.total", "value": 100}),
        );
        let point: MetricPoint = r.payload_as().unwrap();
        assert_eq!(point.value, 100.0);
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let r = record(RecordKind::Traces, json!({"trace_id": "t1"}));
        let err = r.payload_as::<TraceSpan>().unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload { .. }));
    }

    #[test]
    fn test_negative_duration_is_invalid() {
        let r = record(
            RecordKind::Tasks,
            json!({"task_id": "t", "status": "done", "duration_ms": -5.0}),
        );
        let err = r.payload_as::<TaskEvent>().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidField { field: "duration_ms", .. }
        ));
    }

    #[test]
    fn test_node_round_trip_keeps_payload() {
        let r = record(RecordKind::Audit, json!({"action": "deploy", "actor": "ci"}));
        let node = r.to_node();
        assert_eq!(node.node_type, "raw.audit");
        assert_eq!(RawRecord::from_node(RecordKind::Audit, &node).unwrap(), r);
        assert!(RawRecord::from_node(RecordKind::Tasks, &node).is_err());
    }
}
