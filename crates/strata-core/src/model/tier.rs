//! Consolidation tiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Granularity level of consolidation, ordered bottom-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Fixed 6-hour blocks starting 00/06/12/18 UTC.
    Basic,
    /// UTC midnight to midnight.
    Daily,
    /// Monday 00:00 to the following Monday 00:00 UTC.
    Weekly,
    /// 1st of the month 00:00 to the 1st of the next month 00:00 UTC.
    Monthly,
}

impl Tier {
    /// Every tier in the order a cycle processes them.
    pub const ALL: [Tier; 4] = [Tier::Basic, Tier::Daily, Tier::Weekly, Tier::Monthly];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
            Tier::Monthly => "monthly",
        }
    }

    /// Tier whose summaries feed this one; `None` means raw records.
    ///
    /// Monthly reads daily summaries because weeks do not nest in months.
    pub fn input_tier(self) -> Option<Tier> {
        match self {
            Tier::Basic => None,
            Tier::Daily => Some(Tier::Basic),
            Tier::Weekly | Tier::Monthly => Some(Tier::Daily),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownTier(s.to_string()))
    }
}
