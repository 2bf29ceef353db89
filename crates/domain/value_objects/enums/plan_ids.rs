use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlanId {
    Monthly,
    Annual,
    Promotional,
}

impl PlanId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Monthly => "monthly",
            PlanId::Annual => "annual",
            PlanId::Promotional => "promotional",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(PlanId::Monthly),
            "annual" | "yearly" => Some(PlanId::Annual),
            "promotional" | "promo" => Some(PlanId::Promotional),
            _ => None,
        }
    }

    /// Fallback for prices that are not in the catalog: infer from the recurring interval.
    pub fn from_interval(interval: &str) -> Option<Self> {
        match interval {
            "month" => Some(PlanId::Monthly),
            "year" => Some(PlanId::Annual),
            _ => None,
        }
    }
}

impl Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
