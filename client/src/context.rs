use std::sync::Arc;

use chrono::Utc;
use crates::domain::value_objects::{
    enums::{subscription_actions::SubscriptionAction, subscription_statuses::SubscriptionStatus},
    subscriptions::{
        EntitlementSnapshot, SubscriptionActionRequest, SubscriptionActionResponse,
        normalize_email,
    },
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    api::EntitlementApi,
    error::{ClientError, ClientResult},
    state::{CachedSnapshot, EntitlementView, LocalState},
    storage::LocalStore,
};

/// Client-side view of the signed-in user's entitlement.
///
/// The backend stays the source of truth: the only local writes are the cached
/// answer of the last refresh and optimistic snapshots after user actions, both
/// replaced by the next successful refresh.
pub struct SubscriptionContext<Store, Api>
where
    Store: LocalStore + 'static,
    Api: EntitlementApi + 'static,
{
    store: Arc<Store>,
    api: Arc<Api>,
    view_tx: watch::Sender<EntitlementView>,
}

impl<Store, Api> SubscriptionContext<Store, Api>
where
    Store: LocalStore + 'static,
    Api: EntitlementApi + 'static,
{
    pub fn new(store: Arc<Store>, api: Arc<Api>) -> Self {
        let (view_tx, _) = watch::channel(EntitlementView::Loading);
        Self {
            store,
            api,
            view_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EntitlementView> {
        self.view_tx.subscribe()
    }

    pub fn current(&self) -> EntitlementView {
        self.view_tx.borrow().clone()
    }

    /// Active from any snapshot we hold, fresh or stale.
    pub fn is_premium(&self) -> bool {
        self.view_tx.borrow().is_premium_at(Utc::now())
    }

    /// Active according to an answer the server just gave.
    pub fn is_premium_fresh(&self) -> bool {
        self.view_tx.borrow().is_premium_fresh_at(Utc::now())
    }

    /// Local storage is best effort here: a failing store never hides the server's answer.
    pub async fn refresh(&self) -> ClientResult<EntitlementView> {
        let mut state = match self.store.load().await {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "subscription_context: local state unreadable");
                return Ok(self.publish(EntitlementView::Unknown));
            }
        };

        if state.reset_requested {
            info!("subscription_context: reset flag found, clearing local state");
            if let Err(err) = self.store.clear().await {
                warn!(error = %err, "subscription_context: failed to clear local state");
            }
            return Ok(self.publish(EntitlementView::none_at(Utc::now())));
        }

        let Some(email) = state.email.clone() else {
            return Ok(self.publish(EntitlementView::none_at(Utc::now())));
        };

        self.publish(EntitlementView::Loading);

        match self.api.fetch_entitlement(&email).await {
            Ok(snapshot) => {
                let cached = CachedSnapshot::Authoritative {
                    snapshot,
                    fetched_at: Utc::now(),
                };
                state.cached = Some(cached.clone());
                let view = self.publish(EntitlementView::Fresh(cached));
                if let Err(err) = self.store.save(&state).await {
                    warn!(error = %err, "subscription_context: failed to cache snapshot");
                }
                Ok(view)
            }
            Err(err) => {
                let view = match state.cached {
                    Some(cached) => {
                        let age = Utc::now() - cached.recorded_at();
                        warn!(
                            error = %err,
                            age_secs = age.num_seconds(),
                            "subscription_context: refresh failed, serving cached snapshot"
                        );
                        EntitlementView::Stale { cached, age }
                    }
                    None => {
                        warn!(error = %err, "subscription_context: refresh failed with nothing cached");
                        EntitlementView::Unknown
                    }
                };
                Ok(self.publish(view))
            }
        }
    }

    pub async fn apply_optimistic(&self, snapshot: EntitlementSnapshot) -> ClientResult<EntitlementView> {
        let mut state = self.store.load().await?;
        let cached = CachedSnapshot::Optimistic {
            snapshot,
            issued_at: Utc::now(),
        };
        state.cached = Some(cached.clone());
        self.store.save(&state).await?;

        Ok(self.publish(EntitlementView::Fresh(cached)))
    }

    pub async fn login(&self, email: &str) -> ClientResult<EntitlementView> {
        let email = normalize_email(email).ok_or(ClientError::InvalidEmail)?;
        let previous = self.store.load().await?;

        // A different identity must not inherit the previous user's cache.
        let cached = previous
            .cached
            .filter(|_| previous.email.as_deref() == Some(email.as_str()));

        self.store
            .save(&LocalState {
                email: Some(email),
                cached,
                reset_requested: false,
            })
            .await?;

        self.refresh().await
    }

    pub async fn logout(&self) -> ClientResult<EntitlementView> {
        self.store.clear().await?;
        Ok(self.publish(EntitlementView::none_at(Utc::now())))
    }

    /// Marks local state for clearing on the next refresh.
    pub async fn request_reset(&self) -> ClientResult<()> {
        let mut state = self.store.load().await?;
        state.reset_requested = true;
        self.store.save(&state).await
    }

    /// Asks the backend to cancel or reactivate, then shows the result before the
    /// webhook has reached the store.
    pub async fn request_action(
        &self,
        subscription_id: &str,
        action: SubscriptionAction,
    ) -> ClientResult<SubscriptionActionResponse> {
        let response = self
            .api
            .request_action(SubscriptionActionRequest {
                subscription_id: subscription_id.to_string(),
                action,
            })
            .await?;

        let base = self
            .store
            .load()
            .await?
            .cached
            .map(|cached| cached.snapshot().clone())
            .unwrap_or_else(EntitlementSnapshot::none);

        self.apply_optimistic(optimistic_snapshot(base, &response))
            .await?;

        Ok(response)
    }

    fn publish(&self, view: EntitlementView) -> EntitlementView {
        self.view_tx.send_replace(view.clone());
        view
    }
}

fn optimistic_snapshot(
    base: EntitlementSnapshot,
    response: &SubscriptionActionResponse,
) -> EntitlementSnapshot {
    let now = Utc::now();
    let is_active = base.is_active
        && response.status == SubscriptionStatus::Active
        && response.current_period_end.is_some_and(|end| now < end);

    EntitlementSnapshot {
        status: response.status,
        subscription_id: Some(response.subscription_id.clone()),
        cancel_at_period_end: Some(response.cancel_at_period_end),
        current_period_end: response.current_period_end.or(base.current_period_end),
        is_active,
        ..base
    }
}
