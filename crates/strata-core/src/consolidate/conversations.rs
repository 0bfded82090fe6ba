//! Conversation message consolidation.

use serde::{Deserialize, Serialize};

use super::common::{add_count, merge_tally, per_hour, tally_of, Aggregate, Tally};
use crate::error::{AggregationError, ValidationError};
use crate::model::{ConversationMessage, Period, RawRecord, RecordKind, SummaryData};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationsSummary {
    pub message_count: u64,
    pub channels: Tally,
    pub roles: Tally,
    pub total_tokens: u64,
    pub messages_per_hour: f64,
}

impl Aggregate for ConversationsSummary {
    const KIND: RecordKind = RecordKind::Conversations;

    fn from_record(record: &RawRecord) -> Result<Self, ValidationError> {
        let message: ConversationMessage = record.payload_as()?;
        Ok(Self {
            message_count: 1,
            channels: tally_of(&message.channel_id),
            roles: tally_of(&message.role),
            total_tokens: message.tokens.unwrap_or(0),
            messages_per_hour: 0.0,
        })
    }

    fn from_data(data: SummaryData) -> Option<Self> {
        match data {
            SummaryData::Conversations(summary) => Some(summary),
            _ => None,
        }
    }

    fn merge(&mut self, other: Self) -> Result<(), AggregationError> {
        add_count(&mut self.message_count, other.message_count, "message_count")?;
        merge_tally(&mut self.channels, other.channels, "channels")?;
        merge_tally(&mut self.roles, other.roles, "roles")?;
        add_count(&mut self.total_tokens, other.total_tokens, "total_tokens")
    }

    fn finalize(&mut self, period: &Period) {
        self.messages_per_hour = per_hour(self.message_count as f64, period.duration_hours());
    }

    fn into_data(self) -> SummaryData {
        SummaryData::Conversations(self)
    }
}
