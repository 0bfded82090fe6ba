//! Record kinds and their node-type naming.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::tier::Tier;
use crate::error::ValidationError;

/// Kind of record the engine consolidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Metrics,
    Audit,
    Traces,
    Conversations,
    Tasks,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Metrics,
        RecordKind::Audit,
        RecordKind::Traces,
        RecordKind::Conversations,
        RecordKind::Tasks,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Metrics => "metrics",
            RecordKind::Audit => "audit",
            RecordKind::Traces => "traces",
            RecordKind::Conversations => "conversations",
            RecordKind::Tasks => "tasks",
        }
    }

    /// Static purge policy. Audit records back the permanent ledger and are
    /// never deleted by cleanup.
    pub fn exempt_from_purge(self) -> bool {
        matches!(self, RecordKind::Audit)
    }

    /// Node type of raw records, e.g. `raw.metrics`.
    pub fn raw_node_type(self) -> String {
        format!("raw.{}", self.as_str())
    }

    /// Node type of summaries, e.g. `summary.metrics.daily`.
    pub fn summary_node_type(self, tier: Tier) -> String {
        format!("summary.{}.{}", self.as_str(), tier.as_str())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_types() {
        assert_eq!(RecordKind::Traces.raw_node_type(), "raw.traces");
        assert_eq!(
            RecordKind::Tasks.summary_node_type(Tier::Weekly),
            "summary.tasks.weekly"
        );
    }

    #[test]
    fn test_only_audit_is_statically_exempt() {
        let exempt: Vec<_> = RecordKind::ALL
            .into_iter()
            .filter(|k| k.exempt_from_purge())
            .collect();
        assert_eq!(exempt, vec![RecordKind::Audit]);
    }

    #[test]
    fn test_parse() {
        assert_eq!("audit".parse::<RecordKind>().unwrap(), RecordKind::Audit);
        assert!("logs".parse::<RecordKind>().is_err());
    }
}
