use std::{collections::HashMap, sync::Arc};

use anyhow::{Result as AnyResult, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use crates::{
    domain::value_objects::{
        enums::{plan_ids::PlanId, subscription_statuses::SubscriptionStatus},
        plans::PlanCatalog,
        subscriptions::{
            CreateCheckoutRequest, CreateCheckoutResponse, SubscriptionActionRequest,
            SubscriptionActionResponse, normalize_email,
        },
    },
    payments::stripe_client::{StripeClient, StripeCustomer, StripeEvent, StripeSubscription},
};
use thiserror::Error;
use tracing::{error, info, warn};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StripeGateway: Send + Sync {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription>;

    async fn retrieve_customer(&self, customer_id: &str) -> AnyResult<StripeCustomer>;

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> AnyResult<StripeSubscription>;

    async fn find_or_create_customer(&self, email: &str) -> AnyResult<String>;

    async fn create_checkout_session(
        &self,
        price_id: &str,
        customer_id: &str,
        metadata: HashMap<String, String>,
    ) -> AnyResult<String>;
}

#[async_trait]
impl StripeGateway for StripeClient {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent> {
        self.verify_webhook_signature(payload, signature)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription> {
        self.retrieve_subscription(subscription_id).await
    }

    async fn retrieve_customer(&self, customer_id: &str) -> AnyResult<StripeCustomer> {
        self.retrieve_customer(customer_id).await
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> AnyResult<StripeSubscription> {
        self.set_cancel_at_period_end(subscription_id, cancel_at_period_end)
            .await
    }

    async fn find_or_create_customer(&self, email: &str) -> AnyResult<String> {
        match self.find_customer_by_email(email).await? {
            Some(customer) if !customer.deleted => Ok(customer.id),
            _ => self.create_customer(email).await,
        }
    }

    async fn create_checkout_session(
        &self,
        price_id: &str,
        customer_id: &str,
        metadata: HashMap<String, String>,
    ) -> AnyResult<String> {
        self.create_checkout_session(price_id, customer_id, metadata)
            .await
    }
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("webhook signature verification failed")]
    InvalidSignature,
    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),
    #[error("email is required")]
    MissingEmail,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("no price configured for plan {0}")]
    PlanNotPriced(PlanId),
    #[error("billing provider request failed")]
    Upstream(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::InvalidSignature
            | SubscriptionError::InvalidWebhook(_)
            | SubscriptionError::MissingEmail
            | SubscriptionError::InvalidRequest(_)
            | SubscriptionError::PlanNotPriced(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::Upstream(_) | SubscriptionError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

pub(crate) fn ts_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

/// Catalog price id first, then subscription metadata, then the recurring interval.
pub(crate) fn resolve_plan(catalog: &PlanCatalog, subscription: &StripeSubscription) -> Option<PlanId> {
    let price = subscription.first_price();

    price
        .and_then(|price| catalog.plan_for_price(&price.id))
        .or_else(|| {
            subscription
                .metadata
                .get("plan")
                .and_then(|value| PlanId::from_str(value))
        })
        .or_else(|| {
            price
                .and_then(|price| price.recurring.as_ref())
                .and_then(|recurring| PlanId::from_interval(&recurring.interval))
        })
}

/// User-initiated subscription changes. These talk to Stripe only; the local store
/// catches up when the resulting webhook arrives.
pub struct SubscriptionUseCase<Stripe>
where
    Stripe: StripeGateway + Send + Sync + 'static,
{
    stripe_client: Arc<Stripe>,
    plan_catalog: PlanCatalog,
}

impl<Stripe> SubscriptionUseCase<Stripe>
where
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub fn new(stripe_client: Arc<Stripe>, plan_catalog: PlanCatalog) -> Self {
        Self {
            stripe_client,
            plan_catalog,
        }
    }

    pub async fn apply_action(
        &self,
        request: SubscriptionActionRequest,
    ) -> UseCaseResult<SubscriptionActionResponse> {
        let subscription_id = request.subscription_id.trim();
        if subscription_id.is_empty() {
            let err = SubscriptionError::InvalidRequest("subscriptionId is required".to_string());
            warn!(
                action = %request.action,
                status = err.status_code().as_u16(),
                "subscriptions: action requested without subscription id"
            );
            return Err(err);
        }

        info!(
            %subscription_id,
            action = %request.action,
            "subscriptions: applying action at Stripe"
        );

        let updated = self
            .stripe_client
            .set_cancel_at_period_end(subscription_id, request.action.cancel_at_period_end())
            .await
            .map_err(|err| {
                error!(
                    %subscription_id,
                    action = %request.action,
                    error = ?err,
                    "subscriptions: stripe subscription update failed"
                );
                SubscriptionError::Upstream(err)
            })?;

        info!(
            subscription_id = %updated.id,
            stripe_status = %updated.status,
            cancel_at_period_end = updated.cancel_at_period_end,
            "subscriptions: action applied"
        );

        Ok(SubscriptionActionResponse {
            subscription_id: updated.id.clone(),
            status: SubscriptionStatus::from_stripe(&updated.status),
            cancel_at_period_end: updated.cancel_at_period_end,
            current_period_end: updated.period_end().and_then(ts_to_datetime),
        })
    }

    pub async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> UseCaseResult<CreateCheckoutResponse> {
        let email = normalize_email(&request.email).ok_or_else(|| {
            let err = SubscriptionError::MissingEmail;
            warn!(
                plan = %request.plan,
                status = err.status_code().as_u16(),
                "subscriptions: missing email for checkout"
            );
            err
        })?;

        let price_id = self
            .plan_catalog
            .price_for(request.plan)
            .ok_or_else(|| {
                let err = SubscriptionError::PlanNotPriced(request.plan);
                warn!(
                    plan = %request.plan,
                    status = err.status_code().as_u16(),
                    "subscriptions: checkout requested for unpriced plan"
                );
                err
            })?
            .to_string();

        info!(%email, plan = %request.plan, "subscriptions: create checkout session requested");

        let customer_id = self
            .stripe_client
            .find_or_create_customer(&email)
            .await
            .map_err(|err| {
                error!(%email, error = ?err, "subscriptions: failed to resolve stripe customer");
                SubscriptionError::Upstream(err)
            })?;

        let metadata = HashMap::from([
            ("plan".to_string(), request.plan.to_string()),
            ("user_email".to_string(), email.clone()),
        ]);

        let checkout_url = self
            .stripe_client
            .create_checkout_session(&price_id, &customer_id, metadata)
            .await
            .map_err(|err| {
                error!(
                    %email,
                    %customer_id,
                    error = ?err,
                    "subscriptions: failed to create checkout session"
                );
                SubscriptionError::Upstream(err)
            })?;

        if checkout_url.is_empty() {
            return Err(SubscriptionError::Upstream(anyhow!(
                "Stripe returned an empty checkout url"
            )));
        }

        info!(%email, %customer_id, "subscriptions: checkout session created");

        Ok(CreateCheckoutResponse { checkout_url })
    }
}
