use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    routing::{get, post},
};
use crates::{
    domain::{
        repositories::subscriptions::SubscriptionRepository,
        value_objects::{
            plans::PlanCatalog,
            subscriptions::{
                CreateCheckoutRequest, CreateCheckoutResponse, EntitlementQuery,
                EntitlementSnapshot, SubscriptionActionRequest, SubscriptionActionResponse,
            },
        },
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::subscriptions::SubscriptionPostgres,
    },
    payments::stripe_client::StripeClient,
};

use crate::usecases::{
    entitlements::EntitlementUseCase,
    subscriptions::{StripeGateway, SubscriptionError, SubscriptionUseCase},
};

pub struct SubscriptionsState<S, Stripe>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub entitlements: Arc<EntitlementUseCase<S>>,
    pub subscriptions: Arc<SubscriptionUseCase<Stripe>>,
}

impl<S, Stripe> Clone for SubscriptionsState<S, Stripe>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            entitlements: Arc::clone(&self.entitlements),
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }
}

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    stripe_client: Arc<StripeClient>,
    plan_catalog: PlanCatalog,
) -> Router {
    let subscriptions_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let entitlement_usecase = EntitlementUseCase::new(Arc::new(subscriptions_repository));
    let subscription_usecase = SubscriptionUseCase::new(stripe_client, plan_catalog);

    router(SubscriptionsState {
        entitlements: Arc::new(entitlement_usecase),
        subscriptions: Arc::new(subscription_usecase),
    })
}

pub fn router<S, Stripe>(state: SubscriptionsState<S, Stripe>) -> Router
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/entitlement", get(get_entitlement::<S, Stripe>))
        .route("/action", post(apply_action::<S, Stripe>))
        .route("/checkout", post(create_checkout_session::<S, Stripe>))
        .with_state(state)
}

pub async fn get_entitlement<S, Stripe>(
    State(state): State<SubscriptionsState<S, Stripe>>,
    Query(query): Query<EntitlementQuery>,
) -> Result<Json<EntitlementSnapshot>, SubscriptionError>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    state
        .entitlements
        .get_entitlement(query.email.as_deref())
        .await
        .map(Json)
}

pub async fn apply_action<S, Stripe>(
    State(state): State<SubscriptionsState<S, Stripe>>,
    payload: Result<Json<SubscriptionActionRequest>, JsonRejection>,
) -> Result<Json<SubscriptionActionResponse>, SubscriptionError>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let Json(request) =
        payload.map_err(|rejection| SubscriptionError::InvalidRequest(rejection.body_text()))?;

    state.subscriptions.apply_action(request).await.map(Json)
}

pub async fn create_checkout_session<S, Stripe>(
    State(state): State<SubscriptionsState<S, Stripe>>,
    payload: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Result<Json<CreateCheckoutResponse>, SubscriptionError>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let Json(request) =
        payload.map_err(|rejection| SubscriptionError::InvalidRequest(rejection.body_text()))?;

    state
        .subscriptions
        .create_checkout_session(request)
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::{
        subscriptions::{MockStripeGateway, tests::stripe_subscription},
        test_support::{PERIOD_END, subscription_object},
    };
    use anyhow::anyhow;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use chrono::{Duration, Utc};
    use crates::domain::{
        entities::subscriptions::SubscriptionEntity,
        repositories::subscriptions::MockSubscriptionRepository,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(repo: MockSubscriptionRepository, stripe: MockStripeGateway) -> Router {
        router(SubscriptionsState {
            entitlements: Arc::new(EntitlementUseCase::new(Arc::new(repo))),
            subscriptions: Arc::new(SubscriptionUseCase::new(
                Arc::new(stripe),
                PlanCatalog {
                    monthly_price_id: Some("price_month".to_string()),
                    annual_price_id: None,
                    promotional_price_id: None,
                },
            )),
        })
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn record(email: &str) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            user_email: email.to_string(),
            billing_customer_id: "cus_1".to_string(),
            billing_subscription_id: "sub_1".to_string(),
            plan_id: Some("monthly".to_string()),
            status: "active".to_string(),
            current_period_start: now - Duration::days(3),
            current_period_end: now + Duration::days(27),
            cancel_at_period_end: false,
            payment_confirmed: true,
            last_event_at: now - Duration::days(3),
            updated_at: now - Duration::days(3),
        }
    }

    #[tokio::test]
    async fn entitlement_without_email_is_bad_request() {
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_email().times(0);

        let response = app(repo, MockStripeGateway::new())
            .oneshot(
                Request::builder()
                    .uri("/entitlement")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], 400);
    }

    #[tokio::test]
    async fn entitlement_returns_snapshot_json() {
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_email()
            .withf(|email| email == "a@example.com")
            .returning(|email| Ok(Some(record(email))));

        let response = app(repo, MockStripeGateway::new())
            .oneshot(
                Request::builder()
                    .uri("/entitlement?email=A%40Example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "active");
        assert_eq!(json["plan"], "monthly");
        assert_eq!(json["subscriptionId"], "sub_1");
        assert_eq!(json["isActive"], true);
    }

    #[tokio::test]
    async fn entitlement_store_error_is_internal_and_hides_details() {
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_email()
            .returning(|_| Err(anyhow!("connection refused at 10.0.0.3")));

        let response = app(repo, MockStripeGateway::new())
            .oneshot(
                Request::builder()
                    .uri("/entitlement?email=a@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(!json["message"].as_str().unwrap().contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn cancel_action_returns_updated_subscription() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_set_cancel_at_period_end()
            .withf(|subscription_id, cancel| subscription_id == "sub_1" && *cancel)
            .times(1)
            .returning(|_, _| Ok(stripe_subscription(subscription_object("active", true))));

        let response = app(MockSubscriptionRepository::new(), stripe)
            .oneshot(json_request(
                "/action",
                json!({ "subscriptionId": "sub_1", "action": "cancel" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["subscriptionId"], "sub_1");
        assert_eq!(json["status"], "active");
        assert_eq!(json["cancelAtPeriodEnd"], true);
        assert_eq!(
            json["currentPeriodEnd"],
            serde_json::to_value(crate::usecases::subscriptions::ts_to_datetime(PERIOD_END))
                .unwrap()
        );
    }

    #[tokio::test]
    async fn unknown_action_is_bad_request() {
        let mut stripe = MockStripeGateway::new();
        stripe.expect_set_cancel_at_period_end().times(0);

        let response = app(MockSubscriptionRepository::new(), stripe)
            .oneshot(json_request(
                "/action",
                json!({ "subscriptionId": "sub_1", "action": "pause" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn checkout_for_unpriced_plan_is_bad_request() {
        let mut stripe = MockStripeGateway::new();
        stripe.expect_find_or_create_customer().times(0);

        let response = app(MockSubscriptionRepository::new(), stripe)
            .oneshot(json_request(
                "/checkout",
                json!({ "email": "a@example.com", "plan": "annual" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn checkout_returns_session_url() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_find_or_create_customer()
            .withf(|email| email == "a@example.com")
            .returning(|_| Ok("cus_1".to_string()));
        stripe
            .expect_create_checkout_session()
            .withf(|price_id, customer_id, _| price_id == "price_month" && customer_id == "cus_1")
            .returning(|_, _, _| Ok("https://checkout.stripe.com/c/pay/cs_test".to_string()));

        let response = app(MockSubscriptionRepository::new(), stripe)
            .oneshot(json_request(
                "/checkout",
                json!({ "email": "a@example.com", "plan": "monthly" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["checkoutUrl"],
            "https://checkout.stripe.com/c/pay/cs_test"
        );
    }
}
