use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use crates::{
    domain::{
        repositories::subscriptions::SubscriptionRepository,
        value_objects::{
            enums::subscription_statuses::SubscriptionStatus,
            plans::PlanCatalog,
            subscriptions::{UpsertOutcome, UpsertSubscriptionModel, normalize_email},
        },
    },
    payments::stripe_client::{StripeEvent, StripeInvoice, StripeSubscription},
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::subscriptions::{
    StripeGateway, SubscriptionError, UseCaseResult, resolve_plan, ts_to_datetime,
};

/// What happened to a verified webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { user_email: String },
    /// The store already holds a snapshot from a newer event.
    Stale { user_email: String },
    /// The customer has no resolvable email, so there is no record to key on.
    SkippedMissingEmail { customer_id: String },
    Ignored { event_type: String },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::Stale { .. } => "stale",
            WebhookOutcome::SkippedMissingEmail { .. } => "skipped_missing_email",
            WebhookOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// How a snapshot's `payment_confirmed` and `status` are derived for each event kind.
#[derive(Debug, Clone, Copy)]
enum Reconciliation {
    PaymentSucceeded,
    SubscriptionUpdated,
    SubscriptionDeleted,
}

/// Folds signed Stripe events into the subscription store.
pub struct StripeWebhookUseCase<S, Stripe>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
    stripe_client: Arc<Stripe>,
    plan_catalog: PlanCatalog,
}

impl<S, Stripe> StripeWebhookUseCase<S, Stripe>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<S>, stripe_client: Arc<Stripe>, plan_catalog: PlanCatalog) -> Self {
        Self {
            subscription_repo,
            stripe_client,
            plan_catalog,
        }
    }

    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> UseCaseResult<WebhookOutcome> {
        let event = self
            .stripe_client
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                warn!(
                    error = %err,
                    status = SubscriptionError::InvalidSignature.status_code().as_u16(),
                    "stripe_webhook: verification failed"
                );
                SubscriptionError::InvalidSignature
            })?;

        info!(
            event_id = ?event.id,
            event_type = %event.type_,
            livemode = ?event.livemode,
            "stripe_webhook: event verified"
        );

        match event.type_.as_str() {
            "invoice.payment_succeeded" | "invoice.paid" => {
                self.handle_payment_succeeded(&event).await
            }
            "customer.subscription.updated" => {
                self.handle_subscription_event(&event, Reconciliation::SubscriptionUpdated)
                    .await
            }
            "customer.subscription.deleted" => {
                self.handle_subscription_event(&event, Reconciliation::SubscriptionDeleted)
                    .await
            }
            _ => {
                debug!(event_type = %event.type_, "stripe_webhook: unhandled event type");
                Ok(WebhookOutcome::Ignored {
                    event_type: event.type_.clone(),
                })
            }
        }
    }

    /// Payment events only name the subscription; its current state is re-fetched from Stripe.
    async fn handle_payment_succeeded(&self, event: &StripeEvent) -> UseCaseResult<WebhookOutcome> {
        let invoice: StripeInvoice = parse_object(event, "invoice")?;

        let Some(subscription_id) = invoice.subscription_id() else {
            debug!(
                invoice_id = ?invoice.id,
                customer_id = ?invoice.customer,
                "stripe_webhook: invoice without subscription ignored"
            );
            return Ok(WebhookOutcome::Ignored {
                event_type: event.type_.clone(),
            });
        };

        let subscription = self
            .stripe_client
            .retrieve_subscription(subscription_id)
            .await
            .map_err(|err| {
                error!(
                    %subscription_id,
                    error = ?err,
                    "stripe_webhook: failed to retrieve subscription for paid invoice"
                );
                SubscriptionError::Upstream(err)
            })?;

        self.reconcile(event, &subscription, Reconciliation::PaymentSucceeded)
            .await
    }

    async fn handle_subscription_event(
        &self,
        event: &StripeEvent,
        reconciliation: Reconciliation,
    ) -> UseCaseResult<WebhookOutcome> {
        let subscription: StripeSubscription = parse_object(event, "subscription")?;
        self.reconcile(event, &subscription, reconciliation).await
    }

    async fn reconcile(
        &self,
        event: &StripeEvent,
        subscription: &StripeSubscription,
        reconciliation: Reconciliation,
    ) -> UseCaseResult<WebhookOutcome> {
        let Some(user_email) = self.resolve_customer_email(&subscription.customer).await? else {
            info!(
                customer_id = %subscription.customer,
                subscription_id = %subscription.id,
                event_type = %event.type_,
                "stripe_webhook: customer has no email, skipping event"
            );
            return Ok(WebhookOutcome::SkippedMissingEmail {
                customer_id: subscription.customer.clone(),
            });
        };

        let model = build_snapshot(
            &self.plan_catalog,
            event,
            subscription,
            user_email.clone(),
            reconciliation,
        )?;

        info!(
            %user_email,
            subscription_id = %model.billing_subscription_id,
            status = %model.status,
            payment_confirmed = model.payment_confirmed,
            cancel_at_period_end = model.cancel_at_period_end,
            "stripe_webhook: upserting subscription snapshot"
        );

        let outcome = self
            .subscription_repo
            .upsert_by_email(model.to_entity(Utc::now()))
            .await
            .map_err(|err| {
                error!(
                    %user_email,
                    subscription_id = %subscription.id,
                    db_error = ?err,
                    "stripe_webhook: failed to upsert subscription"
                );
                SubscriptionError::Internal(err)
            })?;

        Ok(match outcome {
            UpsertOutcome::Applied => WebhookOutcome::Applied { user_email },
            UpsertOutcome::Stale => {
                info!(
                    %user_email,
                    event_id = ?event.id,
                    "stripe_webhook: stored snapshot is newer, event not applied"
                );
                WebhookOutcome::Stale { user_email }
            }
        })
    }

    async fn resolve_customer_email(&self, customer_id: &str) -> UseCaseResult<Option<String>> {
        let customer = self
            .stripe_client
            .retrieve_customer(customer_id)
            .await
            .map_err(|err| {
                error!(
                    %customer_id,
                    error = ?err,
                    "stripe_webhook: failed to retrieve customer"
                );
                SubscriptionError::Upstream(err)
            })?;

        if customer.deleted {
            return Ok(None);
        }

        Ok(customer.email.as_deref().and_then(normalize_email))
    }
}

fn parse_object<T: DeserializeOwned>(event: &StripeEvent, kind: &str) -> UseCaseResult<T> {
    serde_json::from_value(event.data.object.clone()).map_err(|err| {
        let err = SubscriptionError::InvalidWebhook(format!("invalid {kind} payload: {err}"));
        warn!(
            event_type = %event.type_,
            status = err.status_code().as_u16(),
            error = %err,
            "stripe_webhook: malformed event object"
        );
        err
    })
}

fn build_snapshot(
    catalog: &PlanCatalog,
    event: &StripeEvent,
    subscription: &StripeSubscription,
    user_email: String,
    reconciliation: Reconciliation,
) -> UseCaseResult<UpsertSubscriptionModel> {
    let period_start = subscription.period_start().and_then(ts_to_datetime);
    let period_end = subscription.period_end().and_then(ts_to_datetime);
    let event_created_at = ts_to_datetime(event.created)
        .ok_or_else(|| SubscriptionError::InvalidWebhook("invalid event timestamp".to_string()))?;

    let (current_period_start, current_period_end) = match (period_start, period_end) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(SubscriptionError::Upstream(anyhow!(
                "subscription {} is missing its current period",
                subscription.id
            )));
        }
    };

    let stripe_status = SubscriptionStatus::from_stripe(&subscription.status);
    let (status, cancel_at_period_end, payment_confirmed) = match reconciliation {
        Reconciliation::PaymentSucceeded => {
            (stripe_status, subscription.cancel_at_period_end, true)
        }
        // A trial reads as active but has not been paid for yet.
        Reconciliation::SubscriptionUpdated => (
            stripe_status,
            subscription.cancel_at_period_end,
            stripe_status == SubscriptionStatus::Active && subscription.status != "trialing",
        ),
        Reconciliation::SubscriptionDeleted => (SubscriptionStatus::Canceled, true, false),
    };

    Ok(UpsertSubscriptionModel {
        user_email,
        billing_customer_id: subscription.customer.clone(),
        billing_subscription_id: subscription.id.clone(),
        plan: resolve_plan(catalog, subscription),
        status,
        current_period_start,
        current_period_end,
        cancel_at_period_end,
        payment_confirmed,
        event_created_at,
    })
}
