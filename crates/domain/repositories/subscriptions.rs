use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity};
use crate::domain::value_objects::subscriptions::UpsertOutcome;

#[automock]
#[async_trait]
pub trait SubscriptionRepository {
    async fn find_by_email(&self, user_email: &str) -> Result<Option<SubscriptionEntity>>;

    /// Inserts or fully overwrites the row for `entity.user_email`, unless the stored row
    /// was written from an event newer than `entity.last_event_at`.
    async fn upsert_by_email(&self, entity: UpsertSubscriptionEntity) -> Result<UpsertOutcome>;
}
