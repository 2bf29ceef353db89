use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::{
    domain::value_objects::enums::{
        plan_ids::PlanId, subscription_statuses::SubscriptionStatus,
    },
    infra::db::postgres::schema::user_subscriptions,
};

/// Current subscription snapshot for one user, keyed by email.
#[derive(Debug, Clone, PartialEq, Selectable, Queryable)]
#[diesel(table_name = user_subscriptions)]
pub struct SubscriptionEntity {
    pub user_email: String,
    pub billing_customer_id: String,
    pub billing_subscription_id: String,
    pub plan_id: Option<String>,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub payment_confirmed: bool,
    pub last_event_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionEntity {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_str(&self.status)
    }

    pub fn plan(&self) -> Option<PlanId> {
        self.plan_id.as_deref().and_then(PlanId::from_str)
    }

    /// Premium access holds only while payment is confirmed, the status is active and
    /// the paid period has not ended. Equal timestamps count as ended.
    pub fn is_entitling_at(&self, now: DateTime<Utc>) -> bool {
        self.payment_confirmed
            && self.status() == SubscriptionStatus::Active
            && self.current_period_end > now
    }
}

/// Full-record overwrite written by the webhook handler.
#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = user_subscriptions, treat_none_as_null = true)]
pub struct UpsertSubscriptionEntity {
    pub user_email: String,
    pub billing_customer_id: String,
    pub billing_subscription_id: String,
    pub plan_id: Option<String>,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub payment_confirmed: bool,
    pub last_event_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UpsertSubscriptionEntity> for SubscriptionEntity {
    fn from(value: UpsertSubscriptionEntity) -> Self {
        Self {
            user_email: value.user_email,
            billing_customer_id: value.billing_customer_id,
            billing_subscription_id: value.billing_subscription_id,
            plan_id: value.plan_id,
            status: value.status,
            current_period_start: value.current_period_start,
            current_period_end: value.current_period_end,
            cancel_at_period_end: value.cancel_at_period_end,
            payment_confirmed: value.payment_confirmed,
            last_event_at: value.last_event_at,
            updated_at: value.updated_at,
        }
    }
}
