use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// User-initiated change applied directly to the provider's subscription object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
    Cancel,
    Reactivate,
}

impl SubscriptionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionAction::Cancel => "cancel",
            SubscriptionAction::Reactivate => "reactivate",
        }
    }

    /// Value sent as `cancel_at_period_end` to the provider.
    pub fn cancel_at_period_end(&self) -> bool {
        matches!(self, SubscriptionAction::Cancel)
    }
}

impl Display for SubscriptionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
