use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use crates::{
    domain::{
        repositories::subscriptions::SubscriptionRepository, value_objects::plans::PlanCatalog,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::subscriptions::SubscriptionPostgres,
    },
    payments::stripe_client::StripeClient,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::usecases::{
    stripe_webhook::StripeWebhookUseCase,
    subscriptions::{StripeGateway, SubscriptionError},
};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    stripe_client: Arc<StripeClient>,
    plan_catalog: PlanCatalog,
) -> Router {
    let subscriptions_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let webhook_usecase = StripeWebhookUseCase::new(
        Arc::new(subscriptions_repository),
        stripe_client,
        plan_catalog,
    );

    router(Arc::new(webhook_usecase))
}

pub fn router<S, Stripe>(usecase: Arc<StripeWebhookUseCase<S, Stripe>>) -> Router
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/stripe", post(stripe_webhook::<S, Stripe>))
        .with_state(usecase)
}

/// Takes the raw body: the signature covers the exact bytes Stripe sent.
pub async fn stripe_webhook<S, Stripe>(
    State(usecase): State<Arc<StripeWebhookUseCase<S, Stripe>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let Some(signature) = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        warn!("stripe_webhook router: missing Stripe-Signature header");
        return SubscriptionError::InvalidSignature.into_response();
    };

    match usecase.handle_stripe_webhook(&body, signature).await {
        Ok(outcome) => {
            info!(outcome = outcome.label(), "stripe_webhook router: event acknowledged");
            (
                StatusCode::OK,
                Json(json!({ "received": true, "outcome": outcome.label() })),
            )
                .into_response()
        }
        Err(err) => {
            error!(
                status = err.status_code().as_u16(),
                error = %err,
                "stripe_webhook router: event rejected"
            );
            err.into_response()
        }
    }
}
