use std::sync::Arc;

use chrono::{DateTime, Utc};
use crates::domain::{
    repositories::subscriptions::SubscriptionRepository,
    value_objects::subscriptions::{EntitlementSnapshot, normalize_email},
};
use tracing::{debug, error, warn};

use super::subscriptions::{SubscriptionError, UseCaseResult};

/// Answers "is this user premium right now" from the stored snapshot and the clock.
pub struct EntitlementUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
}

impl<S> EntitlementUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<S>) -> Self {
        Self { subscription_repo }
    }

    pub async fn get_entitlement(&self, raw_email: Option<&str>) -> UseCaseResult<EntitlementSnapshot> {
        self.get_entitlement_at(raw_email, Utc::now()).await
    }

    pub async fn get_entitlement_at(
        &self,
        raw_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> UseCaseResult<EntitlementSnapshot> {
        let email = raw_email.and_then(normalize_email).ok_or_else(|| {
            let err = SubscriptionError::MissingEmail;
            warn!(
                status = err.status_code().as_u16(),
                "entitlements: query without email"
            );
            err
        })?;

        // A store error is a 500, never "no subscription".
        let record = self
            .subscription_repo
            .find_by_email(&email)
            .await
            .map_err(|err| {
                error!(%email, db_error = ?err, "entitlements: failed to load subscription");
                SubscriptionError::Internal(err)
            })?;

        let snapshot = match record {
            Some(record) => EntitlementSnapshot::from_record(&record, now),
            None => EntitlementSnapshot::none(),
        };

        debug!(
            %email,
            status = %snapshot.status,
            is_active = snapshot.is_active,
            "entitlements: snapshot resolved"
        );

        Ok(snapshot)
    }
}
