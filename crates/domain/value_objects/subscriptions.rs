use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity};
use crate::domain::value_objects::enums::{
    plan_ids::PlanId, subscription_actions::SubscriptionAction,
    subscription_statuses::SubscriptionStatus,
};

/// Trims and lower-cases an email; returns `None` when nothing is left.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}

/// Entitlement view returned by the query endpoint and cached by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSnapshot {
    pub status: SubscriptionStatus,
    pub plan: Option<PlanId>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub cancel_at_period_end: Option<bool>,
    /// Live entitlement check evaluated at query time.
    #[serde(default)]
    pub is_active: bool,
}

impl EntitlementSnapshot {
    pub fn none() -> Self {
        Self {
            status: SubscriptionStatus::None,
            plan: None,
            current_period_end: None,
            subscription_id: None,
            customer_id: None,
            cancel_at_period_end: None,
            is_active: false,
        }
    }

    /// A lapsed record whose stored status still reads `active` keeps reporting
    /// `active`; `is_active` carries the derived answer.
    pub fn from_record(record: &SubscriptionEntity, now: DateTime<Utc>) -> Self {
        let is_active = record.is_entitling_at(now);
        let status = if is_active {
            SubscriptionStatus::Active
        } else {
            record.status()
        };

        Self {
            status,
            plan: record.plan(),
            current_period_end: Some(record.current_period_end),
            subscription_id: Some(record.billing_subscription_id.clone()),
            customer_id: Some(record.billing_customer_id.clone()),
            cancel_at_period_end: Some(record.cancel_at_period_end),
            is_active,
        }
    }
}

/// Snapshot folded into the store for one webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertSubscriptionModel {
    pub user_email: String,
    pub billing_customer_id: String,
    pub billing_subscription_id: String,
    pub plan: Option<PlanId>,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub payment_confirmed: bool,
    /// `created` time of the provider event this snapshot came from.
    pub event_created_at: DateTime<Utc>,
}

impl UpsertSubscriptionModel {
    pub fn to_entity(&self, updated_at: DateTime<Utc>) -> UpsertSubscriptionEntity {
        UpsertSubscriptionEntity {
            user_email: self.user_email.clone(),
            billing_customer_id: self.billing_customer_id.clone(),
            billing_subscription_id: self.billing_subscription_id.clone(),
            plan_id: self.plan.map(|plan| plan.to_string()),
            status: self.status.to_string(),
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            cancel_at_period_end: self.cancel_at_period_end,
            payment_confirmed: self.payment_confirmed,
            last_event_at: self.event_created_at,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    /// The stored record came from a newer event; nothing was written.
    Stale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionActionRequest {
    pub subscription_id: String,
    pub action: SubscriptionAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionActionResponse {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementQuery {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub email: String,
    pub plan: PlanId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutResponse {
    pub checkout_url: String,
}
